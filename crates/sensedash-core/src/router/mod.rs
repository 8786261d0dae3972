//! Navigation module.
//!
//! This module provides the static `RouteTable` describing every navigable
//! view, and the `Navigator` that runs the `SessionGuard` before each
//! view is allowed to activate.

pub mod navigator;
pub mod routes;

pub use navigator::{HardRedirect, Location, Navigation, NavigationError, Navigator};
pub use routes::{NavigationIntent, RouteDescriptor, RouteTable, View, DEFAULT_PATH, LOGIN_PATH};
