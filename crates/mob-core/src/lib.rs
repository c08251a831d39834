pub mod config;
pub mod error;

pub use config::MobConfig;
pub use error::{MobError, Result};
