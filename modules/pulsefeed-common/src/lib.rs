pub mod config;
pub mod error;
pub mod schedule;
pub mod types;

pub use config::Config;
pub use error::PulseError;
pub use schedule::*;
pub use types::*;
