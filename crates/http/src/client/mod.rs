//! Almoner API client
//!
//! Request pipeline: the facade builds an [`OutboundRequest`], the interceptor
//! attaches the current access token, and [`AlmonerClient::send`] dispatches it.
//! A 401 on a non-auth request hands control to the refresh coordinator, which
//! runs at most one refresh at a time and replays the request once with the new
//! token. A refused refresh clears the session, fires the session-expired hook
//! and fails every waiting request with [`ClientError::AuthExpired`].

pub mod auth;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod request;
pub mod retry;
pub mod session;
pub mod singleflight;

use crate::types::{Page, PageQuery};
use self::config::{ClientConfig, normalize_base_url};
use error::ClientError;
use request::{MultipartForm, OutboundRequest, RequestBody};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use retry::{RetryPolicy, Verdict};
use serde::{Serialize, de::DeserializeOwned};
use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
use singleflight::SingleFlight;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Called with the login route once a refresh has been refused
pub type SessionExpiredHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Almoner API client
///
/// Cheap to clone; clones share the session store and the refresh coordinator.
#[derive(Clone)]
pub struct AlmonerClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    http: Client,
    base_url: String,
    session: Arc<dyn SessionStore>,
    /// Outcome of a refresh: the new access token, or `None` when the session ended
    refresh: SingleFlight<Option<String>>,
    login_route: String,
    cookie_refresh: bool,
    on_session_expired: SessionExpiredHook,
}

impl std::fmt::Debug for AlmonerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlmonerClient")
            .field("base_url", &self.inner.base_url)
            .field("refresh", &self.inner.refresh)
            .finish_non_exhaustive()
    }
}

impl AlmonerClient {
    /// Create a new client with default configuration and an in-memory session
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> AlmonerClientBuilder {
        AlmonerClientBuilder::default()
    }

    /// Create a client from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::builder().config(config).build()
    }

    /// Get the normalized base URL (always ending in `/api`)
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.inner.session.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.get().access_token.is_some()
    }

    /// Whether a session refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.in_flight()
    }

    /// Run a request through the pipeline and decode the body
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: OutboundRequest,
    ) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        decode(response).await
    }

    /// Run a request through the pipeline, returning the successful response
    pub async fn send(&self, request: OutboundRequest) -> Result<reqwest::Response, ClientError> {
        let mut policy = RetryPolicy::new(request.is_auth_endpoint());
        let mut token = self.inner.session.get().access_token;

        loop {
            let response = self.inner.dispatch(&request, token.as_deref()).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && policy.on_unauthorized() == Verdict::Refresh {
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    "Unauthorized, recovering session"
                );
                match self.recover(token.as_deref()).await {
                    Ok(fresh) => {
                        token = Some(fresh);
                        policy.on_replay();
                        continue;
                    }
                    Err(e) => {
                        policy.on_refresh_failed();
                        return Err(e);
                    }
                }
            }

            return Err(ClientError::from_response(response).await);
        }
    }

    /// Obtain a token to replay a request that was rejected while carrying `sent`
    async fn recover(&self, sent: Option<&str>) -> Result<String, ClientError> {
        let current = self.inner.session.get().access_token;
        match (sent, current) {
            // Rotated by a refresh that finished after this request went out
            (sent, Some(current)) if sent != Some(current.as_str()) => return Ok(current),
            // Session ended while this request was in flight
            (Some(_), None) => return Err(ClientError::AuthExpired),
            _ => {}
        }

        self.refresh().await
    }

    /// `GET path?params`
    pub async fn get<T, P>(&self, path: &str, params: &P) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let request = OutboundRequest::new(Method::GET, path).with_query(params)?;
        self.execute(request).await
    }

    /// Fetch one page of a list endpoint
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<T>, ClientError> {
        self.get(path, &PageQuery { page, page_size }).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.json_request(Method::POST, path, body).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.json_request(Method::PUT, path, body).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.json_request(Method::PATCH, path, body).await
    }

    /// `DELETE path`; use `T = ()` for endpoints answering 204
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(OutboundRequest::new(Method::DELETE, path))
            .await
    }

    /// `POST` a `multipart/form-data` body (image uploads)
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> Result<T, ClientError> {
        self.execute(OutboundRequest::new(Method::POST, path).with_multipart(form))
            .await
    }

    /// `PATCH` a `multipart/form-data` body (image uploads)
    pub async fn patch_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> Result<T, ClientError> {
        self.execute(OutboundRequest::new(Method::PATCH, path).with_multipart(form))
            .await
    }

    async fn json_request<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = OutboundRequest::new(method, path).with_json(body)?;
        self.execute(request).await
    }
}

impl ClientInner {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one attempt of `request`; any HTTP status is returned as a response
    async fn dispatch(
        &self,
        request: &OutboundRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut builder = self
            .http
            .request(request.method().clone(), self.url(request.path()));

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }

        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()?),
        };

        builder = interceptor::authorize(builder, request, access_token);

        debug!(method = %request.method(), path = %request.path(), "Dispatching request");
        builder.send().await.map_err(|e| {
            warn!(path = %request.path(), error = %e, "Transport failure");
            ClientError::Transport(e)
        })
    }
}

/// Decode a JSON body; an empty body decodes as `null`
pub(crate) async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        Ok(serde_json::from_slice(b"null")?)
    } else {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn default_session_expired_hook() -> SessionExpiredHook {
    Arc::new(|login_route: &str| {
        warn!(login_route, "Session expired, redirecting to login");
    })
}

/// Builder for [`AlmonerClient`]
#[derive(Default)]
pub struct AlmonerClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    login_route: Option<String>,
    cookie_refresh: bool,
    session: Option<Arc<dyn SessionStore>>,
    on_session_expired: Option<SessionExpiredHook>,
}

impl AlmonerClientBuilder {
    /// Set the base URL; `/api` is appended when missing
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-request timeout (15 seconds by default)
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Route passed to the session-expired hook
    #[must_use]
    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = Some(route.into());
        self
    }

    /// Never keep the refresh token client side; refresh relies on the cookie
    #[must_use]
    pub const fn cookie_refresh(mut self, enabled: bool) -> Self {
        self.cookie_refresh = enabled;
        self
    }

    /// Use `store` for the session (in-memory by default)
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session = Some(store);
        self
    }

    /// Called once per refused refresh, after the session has been cleared
    #[must_use]
    pub fn on_session_expired(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(hook));
        self
    }

    /// Apply every setting from `config`
    #[must_use]
    pub fn config(mut self, config: &ClientConfig) -> Self {
        self.base_url = Some(config.base_url.clone());
        self.timeout = Some(config.timeout());
        self.user_agent = Some(config.user_agent.clone());
        self.login_route = Some(config.login_route.clone());
        self.cookie_refresh = config.cookie_refresh;
        if let Some(path) = &config.session_file {
            self.session = Some(Arc::new(FileSessionStore::open(path)));
        }
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AlmonerClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let base_url = normalize_base_url(&base_url)?;

        let http = ClientBuilder::new()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(15)))
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| ClientConfig::default().user_agent),
            )
            .cookie_store(true)
            .build()?;

        let on_session_expired = self
            .on_session_expired
            .unwrap_or_else(default_session_expired_hook);
        let session: Arc<dyn SessionStore> = match self.session {
            Some(store) => store,
            None => Arc::new(MemorySessionStore::new()),
        };

        Ok(AlmonerClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                session,
                refresh: SingleFlight::new(),
                login_route: self.login_route.unwrap_or_else(|| "/login".to_string()),
                cookie_refresh: self.cookie_refresh,
                on_session_expired,
            }),
        })
    }
}
