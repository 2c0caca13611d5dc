//! Token endpoints: login, logout and session refresh

use super::request::{LOGIN_PATH, OutboundRequest, REFRESH_PATH};
use super::session::Session;
use super::error::ClientError;
use super::{AlmonerClient, ClientInner, decode};
use crate::types::{Credentials, RefreshRequest, RefreshResponse, TokenPairResponse};
use reqwest::Method;
use tracing::{info, warn};

impl AlmonerClient {
    /// Exchange credentials for a token pair and start a new session
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let request = OutboundRequest::new(Method::POST, LOGIN_PATH)
            .auth_endpoint()
            .with_json(credentials)?;
        let tokens: TokenPairResponse = self.execute(request).await?;

        let refresh_token = if self.inner.cookie_refresh {
            None
        } else {
            tokens.refresh
        };
        let session = Session::new(tokens.access, refresh_token);
        self.inner.session.set(session.clone());

        info!(email = %credentials.email, "Logged in");
        Ok(session)
    }

    /// End the session locally
    pub fn logout(&self) {
        self.inner.session.clear();
        info!("Logged out");
    }

    /// Refresh the session now, sharing any refresh already in flight.
    ///
    /// A refused refresh ends the session exactly like one triggered by a 401.
    /// The refresh runs as its own task, so dropping this future does not
    /// abandon it.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let inner = std::sync::Arc::clone(&self.inner);
        let outcome = self
            .inner
            .refresh
            .run(move || async move { inner.refresh_session().await })
            .await;

        match outcome {
            Some(Some(access)) => Ok(access),
            Some(None) => Err(ClientError::AuthExpired),
            None => {
                // The session is left untouched; the next 401 starts a new refresh
                warn!("Session refresh task did not complete");
                Err(ClientError::AuthExpired)
            }
        }
    }
}

impl ClientInner {
    /// One refresh round trip. Only ever run inside the single-flight slot.
    ///
    /// Returns the new access token, or `None` after the session has been
    /// terminated.
    pub(super) async fn refresh_session(&self) -> Option<String> {
        let current = self.session.get();

        let mut request = OutboundRequest::new(Method::POST, REFRESH_PATH).auth_endpoint();
        // Without a stored token the HTTP-only cookie carries it
        if let Some(refresh) = current.refresh_token.as_deref() {
            request = match request.with_json(&RefreshRequest { refresh }) {
                Ok(request) => request,
                Err(e) => return self.expire(&e),
            };
        }

        match self.exchange(&request).await {
            Ok(tokens) => {
                let refresh_token = if self.cookie_refresh {
                    None
                } else {
                    tokens.refresh.or(current.refresh_token)
                };
                self.session
                    .set(Session::new(tokens.access.clone(), refresh_token));
                info!("Session refreshed");
                Some(tokens.access)
            }
            Err(e) => self.expire(&e),
        }
    }

    async fn exchange(&self, request: &OutboundRequest) -> Result<RefreshResponse, ClientError> {
        let response = self.dispatch(request, None).await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        decode(response).await
    }

    fn expire(&self, reason: &ClientError) -> Option<String> {
        warn!(error = %reason, "Session refresh refused, ending session");
        self.session.clear();
        (self.on_session_expired)(&self.login_route);
        None
    }
}
