pub mod config;
pub mod error;

pub use config::{Context, SourceConfig};
pub use error::*;
