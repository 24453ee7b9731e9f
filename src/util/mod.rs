//! Utility modules for mlflow-dbapp

pub mod logging;

pub use logging::{init_logging, LoggingConfig};
