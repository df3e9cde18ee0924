pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use engine::MfaEngine;
pub use error::MfaError;
