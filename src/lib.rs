pub mod aggregator;
pub mod config;
pub mod diag;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod server;
pub mod upstream;
pub mod validation;

pub use config::Settings;
pub use error::{ApiError, Result};
pub use handlers::{AppState, SharedState};
pub use server::create_app;
