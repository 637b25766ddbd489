mod client;

pub use client::{Config, ConfigBuilder, HttpSessionStore};
