//! Navigation-time session policy.
//!
//! Every navigation is evaluated against the locally stored credential, in
//! this order: credential expiry/decoding, authentication requirement,
//! login-while-authenticated, unmatched route. No network I/O happens here.
//! The only side effect is purging a rejected credential.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::credential::{Credential, CredentialError};
use super::session::Session;
use crate::router::{NavigationIntent, DEFAULT_PATH, LOGIN_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RedirectTarget {
    Login,
    Default,
}

impl RedirectTarget {
    pub fn path(&self) -> &'static str {
        match self {
            RedirectTarget::Login => LOGIN_PATH,
            RedirectTarget::Default => DEFAULT_PATH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirectReason {
    /// Target needs a session and none is held
    AuthRequired,
    /// Stored credential was malformed or expired and has been purged
    CredentialRejected(CredentialError),
    /// Login view requested while already signed in
    AlreadyAuthenticated,
    /// Path matched no route; diagnostic only
    RouteUnmatched,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Proceed,
    Redirect {
        to: RedirectTarget,
        reason: RedirectReason,
    },
}

impl Decision {
    fn redirect(to: RedirectTarget, reason: RedirectReason) -> Self {
        Decision::Redirect { to, reason }
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, Decision::Proceed)
    }

    pub fn target(&self) -> Option<RedirectTarget> {
        match self {
            Decision::Proceed => None,
            Decision::Redirect { to, .. } => Some(*to),
        }
    }
}

#[derive(Clone)]
pub struct SessionGuard {
    session: Session,
}

impl SessionGuard {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Evaluate a navigation against the wall clock
    pub fn evaluate(&self, intent: &NavigationIntent) -> Decision {
        self.evaluate_at(intent, Utc::now())
    }

    pub fn evaluate_at(&self, intent: &NavigationIntent, now: DateTime<Utc>) -> Decision {
        let mut authenticated = false;

        if let Some(raw) = self.session.token() {
            match Credential::new(raw).validate(now) {
                Ok(_) => authenticated = true,
                Err(e) => {
                    warn!(path = %intent.path, error = %e, "Purging rejected credential");
                    self.session.purge();
                    if intent.requires_auth() {
                        return Decision::redirect(
                            RedirectTarget::Login,
                            RedirectReason::CredentialRejected(e),
                        );
                    }
                    // Public target: the purge stands and evaluation continues unauthenticated.
                }
            }
        }

        let decision = if intent.requires_auth() && !authenticated {
            Decision::redirect(RedirectTarget::Login, RedirectReason::AuthRequired)
        } else if intent.is_login() && authenticated {
            Decision::redirect(RedirectTarget::Default, RedirectReason::AlreadyAuthenticated)
        } else if intent.is_unmatched() && authenticated {
            warn!(path = %intent.path, "Route not matched, redirecting to {}", DEFAULT_PATH);
            Decision::redirect(RedirectTarget::Default, RedirectReason::RouteUnmatched)
        } else {
            Decision::Proceed
        };

        debug!(path = %intent.path, ?decision, "Navigation evaluated");
        decision
    }
}
