use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plaza_core::{PlazaError, PlazaResult, TokenPair};
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::gate::RefreshGate;
use crate::token::TokenStore;

/// Hook invoked during session teardown, before stored credentials are
/// cleared. Stream clients register here so a live stream never races
/// against credential clearing.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Called exactly once per teardown.
    async fn on_session_expired(&self);
}

/// Authenticated request wrapper.
///
/// Attaches the stored bearer credential to every request and, on a
/// 401, refreshes it through the owned [`RefreshGate`] and retries the
/// request exactly once. A second 401 after the retry is a final
/// failure. Requests are sent with a cookie jar enabled, matching the
/// backend's expectation of ambient session cookies on streaming
/// endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    config: TransportConfig,
    store: Arc<dyn TokenStore>,
    gate: RefreshGate,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl ApiClient {
    /// Builds a client over `store` with its own refresh gate.
    pub fn new(config: TransportConfig, store: Arc<dyn TokenStore>) -> PlazaResult<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|err| PlazaError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            config,
            store,
            gate: RefreshGate::new(),
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Registers a teardown hook. Observers run in registration order.
    pub async fn add_session_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers.write().await.push(observer);
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// GET returning deserialized JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> PlazaResult<T> {
        let response = self.execute(Method::GET, path, query, None).await?;
        response
            .json()
            .await
            .map_err(|err| PlazaError::Http(format!("invalid JSON from {path}: {err}")))
    }

    /// POST returning deserialized JSON.
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> PlazaResult<T> {
        let response = self.execute(Method::POST, path, &[], Some(body)).await?;
        response
            .json()
            .await
            .map_err(|err| PlazaError::Http(format!("invalid JSON from {path}: {err}")))
    }

    /// POST where only the status matters; the response body is dropped.
    pub async fn post_ok(&self, path: &str, body: Option<&Value>) -> PlazaResult<()> {
        self.execute(Method::POST, path, &[], body).await?;
        Ok(())
    }

    /// DELETE where only the status matters.
    pub async fn delete_ok(&self, path: &str) -> PlazaResult<()> {
        self.execute(Method::DELETE, path, &[], None).await?;
        Ok(())
    }

    /// Opens a streaming request and hands the raw response to the
    /// caller for incremental consumption.
    ///
    /// Streaming endpoints skip the retry path: a 401 here surfaces
    /// immediately and the stream owner decides whether to reconnect.
    pub async fn open_event_stream(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> PlazaResult<reqwest::Response> {
        let url = self.config.endpoint(path);
        let mut request = self
            .http
            .request(method, &url)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = self.store.access_token().await {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| PlazaError::Transport(format!("stream open on {path} failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PlazaError::Transport(format!(
                "stream open on {path} rejected: {status} {text}"
            )));
        }
        Ok(response)
    }

    /// Exchanges a Kakao OAuth authorization code for a credential pair
    /// and persists it.
    ///
    /// A reply without an access token means the account has no profile
    /// yet and must register first; that surfaces as
    /// [`PlazaError::AuthExpired`].
    pub async fn login_with_kakao_code(&self, code: &str) -> PlazaResult<TokenPair> {
        let reply: Value = self
            .get_json("/auth/login/kakao", &[("code", code.to_owned())])
            .await?;
        let pair: TokenPair = match serde_json::from_value(reply) {
            Ok(pair) => pair,
            Err(_) => {
                return Err(PlazaError::AuthExpired("registration required".to_owned()));
            }
        };
        if pair.access_token.is_empty() {
            return Err(PlazaError::AuthExpired("registration required".to_owned()));
        }
        self.store.store(&pair).await?;
        Ok(pair)
    }

    /// Ends the session locally: observers first, credentials last.
    pub async fn logout(&self) {
        self.teardown_session().await;
    }

    /// Sends one request, refreshing credentials and retrying once on a
    /// 401. The retried request reuses the method, query, and body but
    /// carries the fresh bearer header.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> PlazaResult<reqwest::Response> {
        let url = self.config.endpoint(path);
        let mut token = self.store.access_token().await;
        let mut retried = false;
        loop {
            let mut request = self.http.request(method.clone(), &url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            if let Some(token) = token.as_deref() {
                request = request.bearer_auth(token);
            }
            let response = request
                .send()
                .await
                .map_err(|err| PlazaError::Transport(format!("request to {path} failed: {err}")))?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                let fresh = self.gate.acquire(|| self.refresh_credentials()).await?;
                debug!(path, "retrying request with refreshed credential");
                token = Some(fresh);
                continue;
            }
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(PlazaError::Http(format!("{status} on {path}: {text}")));
            }
            return Ok(response);
        }
    }

    /// Winner-side refresh: called under the gate by exactly one caller
    /// per cycle. Any failure tears the session down before returning,
    /// so teardown runs at most once no matter how many requests hit
    /// 401 concurrently.
    async fn refresh_credentials(&self) -> PlazaResult<TokenPair> {
        let Some(refresh_token) = self.store.refresh_token().await else {
            self.teardown_session().await;
            return Err(PlazaError::AuthExpired(
                "no refresh credential stored".to_owned(),
            ));
        };
        match self.request_refresh(&refresh_token).await {
            Ok(pair) => {
                if let Err(err) = self.store.store(&pair).await {
                    self.teardown_session().await;
                    return Err(err);
                }
                debug!("credential refresh succeeded");
                Ok(pair)
            }
            Err(err) => {
                self.teardown_session().await;
                Err(err)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> PlazaResult<TokenPair> {
        let url = self.config.endpoint("/users/refresh");
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_millis(self.config.refresh_timeout_ms))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|err| PlazaError::AuthExpired(format!("refresh call failed: {err}")))?;
        if !response.status().is_success() {
            return Err(PlazaError::AuthExpired(format!(
                "refresh rejected with status {}",
                response.status()
            )));
        }
        let pair: TokenPair = response
            .json()
            .await
            .map_err(|err| PlazaError::AuthExpired(format!("malformed refresh response: {err}")))?;
        if pair.access_token.is_empty() {
            return Err(PlazaError::AuthExpired(
                "refresh response missing access token".to_owned(),
            ));
        }
        Ok(pair)
    }

    /// Observers run before the store clears so live streams shut down
    /// while credentials still exist.
    async fn teardown_session(&self) {
        warn!("tearing down session");
        let observers = self.observers.read().await.clone();
        for observer in observers {
            observer.on_session_expired().await;
        }
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear stored credentials");
        }
    }
}
