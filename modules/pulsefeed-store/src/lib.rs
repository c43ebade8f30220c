pub mod error;
pub mod item_store;
pub mod recent;

pub use error::{Result, StoreError};
pub use item_store::{ArchivedSnapshot, ItemStore, SampleRecorded};
pub use recent::RecentUpdates;
