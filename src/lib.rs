#![doc = "Parcel drift: find rural property boundaries that moved off flagged deforestation areas between two land-registry surveys"]
mod common;
mod config;
mod error;
mod geom;
mod pipeline;

pub mod analysis;
pub mod layer;
pub mod output;

#[doc(inline)]
pub use config::{RunConfig, SurveyYears};

#[doc(inline)]
pub use error::DriftError;

#[doc(inline)]
pub use geom::{Crs, CrsKind};

#[doc(inline)]
pub use layer::{ParcelLayer, ReferenceLayer};

#[doc(inline)]
pub use pipeline::{run, RunSummary};
