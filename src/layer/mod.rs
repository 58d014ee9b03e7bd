mod load;
pub(crate) mod parcel;
mod reference;
pub mod schema;

pub use load::{inventory, load_flat, load_per_state, load_year, FolderInventory};
pub use parcel::{ParcelLayer, ParcelRecord, RawLayer};
pub use reference::ReferenceLayer;
