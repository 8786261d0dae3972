use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::routes::{RouteDescriptor, RouteTable};
use crate::auth::{Decision, RedirectReason, SessionGuard};
use crate::events::{EventBus, ROUTE_CHANGED};

/// Longest redirect chain followed before giving up
const MAX_REDIRECTS: usize = 8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("Redirect loop while navigating to {requested} (stopped at {last})")]
    RedirectLoop { requested: String, last: String },
}

/// Where the dashboard currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub route: Option<RouteDescriptor>,
    /// Set when the location was assigned by a hard redirect instead of the guard
    pub forced: bool,
}

/// Outcome of one navigation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    pub requested: String,
    pub location: Location,
    /// Each hop taken, with the path it left and why
    pub redirects: Vec<(String, RedirectReason)>,
    /// Position in the order navigations settled, starting at 1
    pub sequence: u64,
}

impl Navigation {
    pub fn was_redirected(&self) -> bool {
        !self.redirects.is_empty()
    }
}

/// Full navigation that skips the guard, as a page reload would.
pub trait HardRedirect: Send + Sync {
    fn hard_redirect(&self, path: &str);
}

#[derive(Default)]
struct NavState {
    location: Option<Location>,
    settled: u64,
}

/// Runs the guard ahead of every view activation and tracks the current location.
pub struct Navigator {
    routes: RouteTable,
    guard: SessionGuard,
    state: Mutex<NavState>,
    events: Option<Arc<EventBus>>,
}

impl Navigator {
    pub fn new(routes: RouteTable, guard: SessionGuard) -> Self {
        Self {
            routes,
            guard,
            state: Mutex::new(NavState::default()),
            events: None,
        }
    }

    /// Publish `route-changed` on the given bus after every location change
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn current(&self) -> Option<Location> {
        self.state.lock().location.clone()
    }

    /// Navigate to `path`, following guard redirects until a view may activate.
    ///
    /// Navigations are processed one at a time; a second caller waits until
    /// the first has settled.
    pub fn navigate(&self, path: &str) -> Result<Navigation, NavigationError> {
        let mut state = self.state.lock();
        let mut redirects = Vec::new();
        let mut target = path.to_string();

        loop {
            let intent = self.routes.resolve(&target);
            match self.guard.evaluate(&intent) {
                Decision::Proceed => {
                    let location = Location {
                        path: intent.path,
                        route: intent.matched,
                        forced: false,
                    };
                    state.location = Some(location.clone());
                    state.settled += 1;
                    let sequence = state.settled;
                    drop(state);

                    info!(requested = path, path = %location.path, hops = redirects.len(), "Navigated");
                    self.announce(&location);
                    return Ok(Navigation {
                        requested: path.to_string(),
                        location,
                        redirects,
                        sequence,
                    });
                }
                Decision::Redirect { to, reason } => {
                    debug!(from = %intent.path, to = to.path(), ?reason, "Guard redirect");
                    redirects.push((intent.path, reason));
                    if redirects.len() > MAX_REDIRECTS {
                        warn!(requested = path, "Too many redirects");
                        return Err(NavigationError::RedirectLoop {
                            requested: path.to_string(),
                            last: to.path().to_string(),
                        });
                    }
                    target = to.path().to_string();
                }
            }
        }
    }

    fn announce(&self, location: &Location) {
        if let Some(events) = &self.events {
            events.publish(
                ROUTE_CHANGED,
                &[json!(location.path), json!(location.route.map(|r| r.name))],
            );
        }
    }
}

impl HardRedirect for Navigator {
    fn hard_redirect(&self, path: &str) {
        let intent = self.routes.resolve(path);
        let location = Location {
            path: intent.path,
            route: intent.matched,
            forced: true,
        };
        {
            let mut state = self.state.lock();
            state.location = Some(location.clone());
            state.settled += 1;
        }
        info!(path = %location.path, "Hard redirect");
        self.announce(&location);
    }
}
