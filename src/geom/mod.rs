mod bbox;
mod crs;

pub(crate) use bbox::{bulk_load, envelope_of};
pub use crs::{Crs, CrsKind};
