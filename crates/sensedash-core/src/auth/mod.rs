//! Authentication module for session state and navigation policy.
//!
//! This module provides:
//! - `SessionStore`: key-value persistence for the `token` and `user` keys
//! - `Session`: establishes and purges the credential/profile pair
//! - `Credential`: decoding of the JWT-shaped token payload and its expiry
//! - `SessionGuard`: the per-navigation proceed/redirect decision

pub mod credential;
pub mod guard;
pub mod session;
pub mod store;

pub use credential::{Claims, Credential, CredentialError};
pub use guard::{Decision, RedirectReason, RedirectTarget, SessionGuard};
pub use session::{Session, UserProfile};
pub use store::{FileStore, MemoryStore, SessionStore, TOKEN_KEY, USER_KEY};
