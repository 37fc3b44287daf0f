pub mod algorithms;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handlers;
pub mod loader;
pub mod materializer;
pub mod models;
pub mod progress;
pub mod schema;
pub mod service;

pub use config::{RunConfig, ServerConfig};
pub use error::Error;
pub use service::run_scope;
