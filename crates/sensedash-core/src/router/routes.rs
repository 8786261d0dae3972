use serde::Serialize;

/// Path of the public login view
pub const LOGIN_PATH: &str = "/login";

/// Path of the default (home) view
pub const DEFAULT_PATH: &str = "/";

/// Views the dashboard can activate. Construction of the view itself
/// belongs to the front-end, this crate only names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum View {
    Login,
    /// Layout shell hosting the nested views
    Home,
    HomeContent,
    MonitorRealtime,
    DataHistory,
    DataAlarm,
    UserManagement,
}

/// Static declaration of one navigable path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub path: &'static str,
    pub name: &'static str,
    pub requires_auth: bool,
    pub view: View,
    /// Layout the view renders inside, for nested routes
    pub layout: Option<View>,
}

/// A pending navigation: the normalized target path and its route, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    pub path: String,
    pub matched: Option<RouteDescriptor>,
}

impl NavigationIntent {
    /// Unmatched paths fall to the wildcard, which is only served to an
    /// authenticated session.
    pub fn requires_auth(&self) -> bool {
        self.matched.map(|r| r.requires_auth).unwrap_or(true)
    }

    pub fn is_login(&self) -> bool {
        self.matched.map(|r| r.path == LOGIN_PATH).unwrap_or(false)
    }

    pub fn is_unmatched(&self) -> bool {
        self.matched.is_none()
    }
}

/// The full navigable surface. Anything not listed resolves via the wildcard.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self { routes }
    }

    /// Routes of the monitoring dashboard
    pub fn standard() -> Self {
        let nested = |path, name, view| RouteDescriptor {
            path,
            name,
            requires_auth: true,
            view,
            layout: Some(View::Home),
        };

        Self::new(vec![
            RouteDescriptor {
                path: LOGIN_PATH,
                name: "Login",
                requires_auth: false,
                view: View::Login,
                layout: None,
            },
            nested(DEFAULT_PATH, "HomeContent", View::HomeContent),
            nested("/monitor/realtime", "MonitorRealtime", View::MonitorRealtime),
            nested("/data/history", "DataHistory", View::DataHistory),
            nested("/data/alarm", "DataAlarm", View::DataAlarm),
            nested("/management", "UserManagement", View::UserManagement),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter()
    }

    /// Resolve a requested location into a navigation intent
    pub fn resolve(&self, location: &str) -> NavigationIntent {
        let path = normalize(location);
        let matched = self
            .routes
            .iter()
            .find(|r| r.path.eq_ignore_ascii_case(&path))
            .copied();
        NavigationIntent { path, matched }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Drop query and fragment, force a leading slash and ignore one trailing slash.
fn normalize(location: &str) -> String {
    let end = location.find(['?', '#']).unwrap_or(location.len());
    let path = location[..end].trim();

    let mut normalized = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}
