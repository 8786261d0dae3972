//! REST API client module for the monitoring backend.
//!
//! This module provides the `ApiClient`, which attaches the stored credential
//! to every outbound call and tears the session down when the backend answers
//! 401. The network itself sits behind the `Transport` trait so the policy can
//! be exercised without a server.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiClient, RequestOptions, TOKEN_HEADER};
pub use error::ApiError;
pub use transport::{OutboundRequest, ReqwestTransport, Transport, TransportError, TransportResponse};
