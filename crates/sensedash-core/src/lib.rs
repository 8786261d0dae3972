//! Core library for sensedash.
//!
//! This crate holds the session policy of the monitoring dashboard:
//! - `auth`: persisted session state, credential decoding and the navigation guard
//! - `router`: the static route table and the navigator that runs the guard
//! - `api`: the authorized request client that attaches the credential and
//!   tears the session down on a 401
//! - `events`: a small publish/subscribe bus for cross-component signaling
//! - `config`: origins, proxy prefixes and timeouts

pub mod api;
pub mod auth;
pub mod config;
pub mod events;
pub mod router;

pub use api::{ApiClient, ApiError, RequestOptions};
pub use auth::{Credential, Session, SessionGuard, SessionStore};
pub use config::Config;
pub use events::EventBus;
pub use router::{Navigator, RouteTable};
