pub mod config;
pub mod gateway;
pub mod ports;
pub mod protocol;

pub use config::{Config, ConfigError};
pub use gateway::{AppState, router};
