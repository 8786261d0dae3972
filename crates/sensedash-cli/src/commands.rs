use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::Value;
use tracing::warn;

use sensedash_core::api::{ApiClient, ApiError, RequestOptions};
use sensedash_core::auth::{Credential, FileStore, Session, SessionGuard, UserProfile};
use sensedash_core::events::{EventBus, SESSION_EXPIRED};
use sensedash_core::router::{Navigator, RouteTable};
use sensedash_core::Config;

/// Everything one command invocation needs, wired to the persisted session.
pub struct App {
    session: Session,
    navigator: Arc<Navigator>,
    client: ApiClient,
}

impl App {
    pub fn open(session_file: Option<PathBuf>) -> Result<Self> {
        let config = Config::load()?;
        let store = match session_file {
            Some(path) => FileStore::at(path),
            None => FileStore::new(&config.cache_dir()?),
        };
        Self::build(config, store)
    }

    fn build(config: Config, store: FileStore) -> Result<Self> {
        let session = Session::new(Arc::new(store));

        let events = EventBus::global();
        events.subscribe(SESSION_EXPIRED, |args| {
            let url = args.first().and_then(Value::as_str).unwrap_or("?");
            eprintln!("Session expired while calling {}. Please log in again.", url);
            Ok(())
        });

        let navigator = Arc::new(
            Navigator::new(RouteTable::standard(), SessionGuard::new(session.clone()))
                .with_events(events.clone()),
        );
        let client = ApiClient::new(config, session.clone())
            .context("Failed to create HTTP client")?
            .with_navigator(navigator.clone())
            .with_events(events);

        Ok(Self {
            session,
            navigator,
            client,
        })
    }

    pub fn login(&self, token: &str, name: &str) -> Result<()> {
        self.session.establish(token, &UserProfile::new(name))?;
        match Credential::new(token).validate(Utc::now()) {
            Ok(claims) => match claims.expires_at() {
                Some(at) => println!("Signed in as {} (expires {})", name, at),
                None => println!("Signed in as {} (no expiry)", name),
            },
            Err(e) => {
                warn!(error = %e, "Storing a credential the guard will reject");
                println!("Signed in as {} (warning: {})", name, e);
            }
        }
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.session.purge();
        println!("Signed out");
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        let Some(token) = self.session.token() else {
            println!("Not signed in");
            return Ok(());
        };

        let user = self
            .session
            .profile()
            .map(|p| p.name)
            .unwrap_or_else(|| "(unknown user)".to_string());
        match Credential::new(token).validate(Utc::now()) {
            Ok(claims) => {
                let expiry = claims
                    .expires_at()
                    .map(|at| at.to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("Signed in as {}, credential expires {}", user, expiry);
            }
            Err(e) => println!("Signed in as {}, but {} (cleared on next navigation)", user, e),
        }
        Ok(())
    }

    pub fn routes(&self) -> Result<()> {
        for route in self.navigator.routes().iter() {
            let access = if route.requires_auth { "auth" } else { "public" };
            println!("{:<20} {:<16} {}", route.path, route.name, access);
        }
        println!("{:<20} {:<16} {}", "*", "(wildcard)", "auth");
        Ok(())
    }

    pub fn navigate(&self, path: &str) -> Result<()> {
        let navigation = self.navigator.navigate(path)?;
        for (from, reason) in &navigation.redirects {
            println!("  {} redirected ({:?})", from, reason);
        }
        let view = navigation
            .location
            .route
            .map(|r| r.name)
            .unwrap_or("(none)");
        println!("{} -> {} [{}]", navigation.requested, navigation.location.path, view);
        Ok(())
    }

    pub async fn get(&self, url: &str, headers: &[String]) -> Result<()> {
        let options = request_options(headers)?;
        self.print(self.client.get(url, options).await)
    }

    pub async fn post(&self, url: &str, body: &str, headers: &[String]) -> Result<()> {
        let data = parse_body(body)?;
        let options = request_options(headers)?;
        self.print(self.client.post(url, &data, options).await)
    }

    pub async fn put(&self, url: &str, body: &str, headers: &[String]) -> Result<()> {
        let data = parse_body(body)?;
        let options = request_options(headers)?;
        self.print(self.client.put(url, &data, options).await)
    }

    pub async fn delete(&self, url: &str, headers: &[String]) -> Result<()> {
        let options = request_options(headers)?;
        self.print(self.client.delete(url, options).await)
    }

    fn print(&self, result: Result<Value, ApiError>) -> Result<()> {
        match result {
            Ok(value) => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
            Err(ApiError::SessionExpired) => {
                if let Some(location) = self.navigator.current() {
                    eprintln!("Now at {}", location.path);
                }
                Err(ApiError::SessionExpired.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).context("Request body must be valid JSON")
}

/// Build per-call options from `Name: value` header arguments
fn request_options(headers: &[String]) -> Result<RequestOptions> {
    headers.iter().try_fold(RequestOptions::default(), |options, raw| {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("Header must look like 'Name: value', got '{}'", raw))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("Invalid header name in '{}'", raw))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("Invalid header value in '{}'", raw))?;
        Ok(options.header(name, value))
    })
}
