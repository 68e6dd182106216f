//! Live-session sync client for Huddle meetings.
//!
//! A [`SessionView`] keeps one persistent push channel per meeting session,
//! reconciles server-pushed roster, turn and comment updates into a
//! [`SessionStore`], and recovers from network interruptions with a bounded
//! reconnection policy. User actions go through the [`ActionGateway`], which
//! writes to the REST collaborator first and uses the push channel only for
//! best-effort hints.

pub mod api;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod model;
pub mod protocol;
pub mod router;
pub mod store;
pub mod terminal;
pub mod view;

pub use api::{HttpSessionApi, SessionApi};
pub use config::{HeartbeatConfig, SyncConfig};
pub use connection::{ConnectionEvent, ConnectionManager, PushChannel};
pub use domain::ReconnectPolicy;
pub use error::{ApiError, ClientError, ValidationError};
pub use gateway::ActionGateway;
pub use store::{ConnectionStatus, LoadFailure, SessionSnapshot, SessionStore};
pub use view::SessionView;
