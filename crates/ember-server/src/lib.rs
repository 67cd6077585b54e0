//! ember-server: the JSON HTTP surface over [`ember_core::MetricsService`].

pub mod error;
mod origin;
pub mod routes;
mod server;

pub use error::ApiError;
pub use origin::RequestOrigin;
pub use routes::{AppState, MAX_BODY_BYTES, dispatch};
pub use server::{Server, spawn_sweeper};
