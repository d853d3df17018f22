pub mod config;
pub mod error;
pub mod routes;

pub use config::QueryApiConfig;
pub use error::ApiError;
pub use routes::{create_router, AppState};
