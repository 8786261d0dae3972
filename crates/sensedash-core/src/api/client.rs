//! Authorized request client for the monitoring backend.
//!
//! Every call carries the stored credential in a `token` header. The
//! credential is not validated here; expiry is the guard's concern on the
//! next navigation. A 401 purges the session and forces the login view.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, warn};

use super::transport::{OutboundRequest, ReqwestTransport, Transport};
use super::ApiError;
use crate::auth::Session;
use crate::config::Config;
use crate::events::{EventBus, SESSION_EXPIRED};
use crate::router::{HardRedirect, LOGIN_PATH};

/// Header carrying the raw credential
pub const TOKEN_HEADER: &str = "token";

/// Per-call options. Headers set here replace the defaults of the same name.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// API client for the monitoring backend.
/// Clone is cheap - the transport, navigator and bus are shared.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Session,
    config: Config,
    navigator: Option<Arc<dyn HardRedirect>>,
    events: Option<Arc<EventBus>>,
}

impl ApiClient {
    /// Create a client over a real HTTP transport
    pub fn new(config: Config, session: Session) -> Result<Self> {
        let transport =
            ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::with_transport(Arc::new(transport), config, session))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: Config, session: Session) -> Self {
        Self {
            transport,
            session,
            config,
            navigator: None,
            events: None,
        }
    }

    /// Where to send the user when the backend rejects the session
    pub fn with_navigator(mut self, navigator: Arc<dyn HardRedirect>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Publish `session-expired` on this bus after a 401
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Issue a request and parse the JSON response body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.send(url, options)
            .await
            .inspect_err(|e| error!(url, error = %e, "HTTP request failed"))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(url, options.method(Method::GET)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        data: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let options = options.method(Method::POST).body(Self::encode_body(data)?);
        self.request(url, options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        data: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let options = options.method(Method::PUT).body(Self::encode_body(data)?);
        self.request(url, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(url, options.method(Method::DELETE)).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let request = OutboundRequest {
            method: options.method,
            url: self.config.resolve_url(url),
            headers: self.merge_headers(options.headers)?,
            body: options.body,
        };
        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ApiError::NetworkFailure(e.to_string()))?;

        if !response.status.is_success() {
            let err = ApiError::from_status(response.status);
            if err.is_session_expired() {
                self.expire_session(url);
            }
            return Err(err);
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    /// Defaults first, then the caller's headers on top
    fn merge_headers(&self, overrides: HeaderMap) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.session.token() {
            let value = HeaderValue::from_str(&token).map_err(|_| {
                ApiError::InvalidRequest("stored credential is not a valid header value".to_string())
            })?;
            headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
        }

        let mut current: Option<HeaderName> = None;
        for (name, value) in overrides {
            // Repeated values of one header arrive with `None` as the name
            match name {
                Some(name) => {
                    headers.insert(name.clone(), value);
                    current = Some(name);
                }
                None => {
                    if let Some(name) = &current {
                        headers.append(name.clone(), value);
                    }
                }
            }
        }
        Ok(headers)
    }

    fn expire_session(&self, url: &str) {
        warn!(url, "Backend rejected credential, ending session");
        self.session.purge();
        match &self.navigator {
            Some(navigator) => navigator.hard_redirect(LOGIN_PATH),
            None => debug!("No navigator attached, skipping redirect to {}", LOGIN_PATH),
        }
        if let Some(events) = &self.events {
            events.publish(SESSION_EXPIRED, &[json!(url)]);
        }
    }

    fn encode_body<B: Serialize>(data: &B) -> Result<String, ApiError> {
        serde_json::to_string(data).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use serde::Deserialize;
    use serde_json::Value;

    use super::*;
    use crate::api::{TransportError, TransportResponse};
    use crate::auth::credential::tests::token_expiring_at;
    use crate::auth::{MemoryStore, SessionGuard, SessionStore, UserProfile, TOKEN_KEY, USER_KEY};
    use crate::router::{Navigator, RouteTable};

    /// Transport that replays scripted responses and records what was sent
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        sent: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        fn reply(self, status: u16, body: &str) -> Self {
            self.responses.lock().push_back(Ok(TransportResponse {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.as_bytes().to_vec(),
            }));
            self
        }

        fn fail(self, message: &str) -> Self {
            self.responses
                .lock()
                .push_back(Err(TransportError(message.to_string())));
            self
        }

        fn last_sent(&self) -> OutboundRequest {
            self.sent.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
            self.sent.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("no scripted response".to_string())))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        transport: Arc<ScriptedTransport>,
        navigator: Arc<Navigator>,
        events: Arc<EventBus>,
        client: ApiClient,
    }

    fn fixture(transport: ScriptedTransport) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(store.clone());
        let transport = Arc::new(transport);
        let navigator = Arc::new(Navigator::new(
            RouteTable::standard(),
            SessionGuard::new(session.clone()),
        ));
        let events = Arc::new(EventBus::new());
        let client = ApiClient::with_transport(transport.clone(), Config::default(), session)
            .with_navigator(navigator.clone())
            .with_events(events.clone());
        Fixture {
            store,
            transport,
            navigator,
            events,
            client,
        }
    }

    fn sign_in(store: &Arc<MemoryStore>) -> String {
        let token = token_expiring_at(chrono::Utc::now() + chrono::Duration::hours(1));
        Session::new(store.clone())
            .establish(&token, &UserProfile::new("operator"))
            .unwrap();
        token
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Station {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn test_attaches_credential_and_default_content_type() {
        let f = fixture(ScriptedTransport::default().reply(200, r#"{"id":3,"name":"North"}"#));
        let token = sign_in(&f.store);

        let station: Station = f
            .client
            .get("/sense/station/3", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(
            station,
            Station {
                id: 3,
                name: "North".to_string()
            }
        );

        let sent = f.transport.last_sent();
        assert_eq!(sent.method, Method::GET);
        assert_eq!(sent.url, "http://localhost:8080/sense/station/3");
        assert_eq!(sent.headers.get(TOKEN_HEADER).unwrap(), token.as_str());
        assert_eq!(sent.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn test_no_token_header_without_credential() {
        let f = fixture(ScriptedTransport::default().reply(200, "[]"));
        let list: Vec<Value> = f
            .client
            .get("/sense/list", RequestOptions::default())
            .await
            .unwrap();
        assert!(list.is_empty());
        assert!(f.transport.last_sent().headers.get(TOKEN_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_expired_credential_is_still_attached() {
        let f = fixture(ScriptedTransport::default().reply(200, "{}"));
        let stale = token_expiring_at(chrono::Utc::now() - chrono::Duration::hours(1));
        f.store.set(TOKEN_KEY, &stale).unwrap();

        let _: Value = f.client.get("/user/profile", RequestOptions::default()).await.unwrap();
        assert_eq!(f.transport.last_sent().headers.get(TOKEN_HEADER).unwrap(), stale.as_str());
        assert!(f.store.get(TOKEN_KEY).is_some());
    }

    #[tokio::test]
    async fn test_caller_headers_take_precedence() {
        let f = fixture(ScriptedTransport::default().reply(200, "{}"));
        sign_in(&f.store);

        let options = RequestOptions::new(Method::POST)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .header(
                HeaderName::from_static(TOKEN_HEADER),
                HeaderValue::from_static("override"),
            )
            .header(
                HeaderName::from_static("x-station"),
                HeaderValue::from_static("7"),
            )
            .body("raw");
        let _: Value = f.client.request("/sense/upload", options).await.unwrap();

        let sent = f.transport.last_sent();
        assert_eq!(sent.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(sent.headers.get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(sent.headers.get(TOKEN_HEADER).unwrap(), "override");
        assert_eq!(sent.headers.get("x-station").unwrap(), "7");
        assert_eq!(sent.body.as_deref(), Some("raw"));
    }

    #[tokio::test]
    async fn test_convenience_methods_bind_method_and_body() {
        let f = fixture(
            ScriptedTransport::default()
                .reply(200, r#"{"ok":true}"#)
                .reply(200, r#"{"ok":true}"#)
                .reply(200, r#"{"ok":true}"#),
        );

        let payload = serde_json::json!({"name": "admin", "role": 1});
        let _: Value = f
            .client
            .post("/user/add", &payload, RequestOptions::default())
            .await
            .unwrap();
        let sent = f.transport.last_sent();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(
            serde_json::from_str::<Value>(sent.body.as_deref().unwrap()).unwrap(),
            payload
        );

        let _: Value = f
            .client
            .put("/user/update", &payload, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(f.transport.last_sent().method, Method::PUT);

        let _: Value = f.client.delete("/user/5", RequestOptions::default()).await.unwrap();
        let sent = f.transport.last_sent();
        assert_eq!(sent.method, Method::DELETE);
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn test_convenience_methods_carry_caller_headers() {
        let f = fixture(ScriptedTransport::default().reply(200, "{}"));
        sign_in(&f.store);

        // The helper's method wins over whatever the options carried
        let options = RequestOptions::new(Method::GET)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json;charset=UTF-8"),
            )
            .header(
                HeaderName::from_static("x-station"),
                HeaderValue::from_static("7"),
            );
        let _: Value = f
            .client
            .post("/sense/alarm/ack", &serde_json::json!({"id": 9}), options)
            .await
            .unwrap();

        let sent = f.transport.last_sent();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(
            sent.headers.get(CONTENT_TYPE).unwrap(),
            "application/json;charset=UTF-8"
        );
        assert_eq!(sent.headers.get("x-station").unwrap(), "7");
        assert!(sent.headers.get(TOKEN_HEADER).is_some());
        assert_eq!(sent.body.as_deref(), Some(r#"{"id":9}"#));
    }

    #[tokio::test]
    async fn test_unauthorized_purges_session_and_forces_login() {
        let f = fixture(ScriptedTransport::default().reply(401, r#"{"msg":"expired"}"#));
        sign_in(&f.store);
        f.navigator.navigate("/data/history").unwrap();

        let expired = Arc::new(Mutex::new(Vec::new()));
        {
            let expired = expired.clone();
            f.events.subscribe(SESSION_EXPIRED, move |args| {
                expired.lock().push(args.to_vec());
                Ok(())
            });
        }

        let result: Result<Value, ApiError> = f
            .client
            .get("/sense/history", RequestOptions::default())
            .await;
        assert_eq!(result, Err(ApiError::SessionExpired));
        assert!(f.store.get(TOKEN_KEY).is_none());
        assert!(f.store.get(USER_KEY).is_none());

        let location = f.navigator.current().unwrap();
        assert_eq!(location.path, LOGIN_PATH);
        assert!(location.forced);
        assert_eq!(*expired.lock(), vec![vec![json!("/sense/history")]]);
    }

    #[tokio::test]
    async fn test_unauthorized_without_credential() {
        let f = fixture(ScriptedTransport::default().reply(401, ""));

        let result: Result<Value, ApiError> = f
            .client
            .request("/user/profile", RequestOptions::new(Method::GET))
            .await;

        assert_eq!(result, Err(ApiError::SessionExpired));
        assert!(f.store.get(TOKEN_KEY).is_none());
        assert!(f.store.get(USER_KEY).is_none());
        assert_eq!(f.navigator.current().unwrap().path, LOGIN_PATH);
    }

    #[tokio::test]
    async fn test_server_error_keeps_session() {
        let f = fixture(ScriptedTransport::default().reply(503, "down"));
        sign_in(&f.store);

        let result: Result<Value, ApiError> = f
            .client
            .get("/sense/realtime", RequestOptions::default())
            .await;
        assert_eq!(
            result,
            Err(ApiError::ServerError {
                status: 503,
                status_text: "Service Unavailable".to_string()
            })
        );
        assert!(f.store.get(TOKEN_KEY).is_some());
        assert!(f.navigator.current().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_keeps_session() {
        let f = fixture(ScriptedTransport::default().fail("connection refused"));
        sign_in(&f.store);

        let result: Result<Value, ApiError> = f
            .client
            .get("/sense/realtime", RequestOptions::default())
            .await;
        assert_eq!(
            result,
            Err(ApiError::NetworkFailure("connection refused".to_string()))
        );
        assert!(f.store.get(TOKEN_KEY).is_some());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let f = fixture(
            ScriptedTransport::default()
                .reply(200, "<html>")
                .reply(204, ""),
        );

        let result: Result<Value, ApiError> = f
            .client
            .get("/sense/realtime", RequestOptions::default())
            .await;
        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));

        // An empty success body is not JSON either
        let result: Result<Value, ApiError> = f
            .client
            .delete("/sense/alarm/1", RequestOptions::default())
            .await;
        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_malformed() {
        let f = fixture(ScriptedTransport::default().reply(200, r#"{"id":"x"}"#));
        let result: Result<Station, ApiError> = f
            .client
            .get("/sense/station/1", RequestOptions::default())
            .await;
        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
    }
}
