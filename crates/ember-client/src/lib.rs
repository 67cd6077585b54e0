//! ember-client: show counter changes before the server confirms them.
//!
//! [`MetricsSet`] is the engine; [`MetricsTransport`] is the network seam
//! with [`HttpTransport`] as the production implementation.

pub mod config;
pub mod engine;
pub mod http;
pub mod optimistic;
pub mod transport;

pub use config::{ClientConfig, RetryPolicy, Timeouts};
pub use engine::{EngineError, EngineEvent, MetricsSet, RefreshOutcome, Tally};
pub use http::HttpTransport;
pub use optimistic::{CounterDelta, Field, FieldDelta, OptimisticUpdate, Proposal, UpdateId, UpdateKind};
pub use transport::{MetricsTransport, TransportError};
