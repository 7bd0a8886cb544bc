pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod server;

pub use auth::{AuthError, Authenticated, StaticTokenVerifier, TokenVerifier};
pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerHandle};
