//! ember-core: engagement counters for ephemeral items.
//!
//! # Conventions
//!
//! - **Errors**: library errors are `thiserror` enums carrying an
//!   [`error::ErrorCode`]; config loading returns `anyhow::Result`.
//! - **Logging**: `tracing` macros with structured fields (`item_id`, `code`).
//! - **Time**: every expiry decision reads a [`clock::Clock`] and passes `now`
//!   into SQL.

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod model;
pub mod protocol;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EmberConfig;
pub use db::{Store, StoreError};
pub use error::ErrorCode;
pub use identity::{Identity, IdentityDeriver};
pub use protocol::{MetricsService, Outcome, ProtocolError, StoreStatus};
