pub mod backfill;
pub mod controller;
pub mod discovery;
pub mod scheduler;
pub mod source;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
