// change-gate-transport/src/rest.rs
// ============================================================================
// Module: REST Device Transport
// Description: HTTPS transport for the device REST API with strict limits.
// Purpose: Issue bounded, authenticated calls against a managed device.
// Dependencies: change-gate-core, reqwest, serde_json, url
// ============================================================================

//! ## Overview
//! The REST transport speaks the device's `/rest` API over HTTPS with basic
//! auth from the active credential. Redirects are disabled, every call
//! carries the configured read timeout, and responses are parsed as JSON.
//! Cleartext HTTP is opt-in for lab devices only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use change_gate_core::Credential;
use change_gate_core::Device;
use change_gate_core::DeviceTransport;
use change_gate_core::SecretMaterial;
use change_gate_core::TransportError;
use change_gate_core::TransportFactory;
use reqwest::Client;
use reqwest::Response;
use reqwest::redirect::Policy;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the REST transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestTransportConfig {
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for RestTransportConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            user_agent: "change-gate/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Factory producing REST transports for `rest` credentials.
#[derive(Debug, Clone, Default)]
pub struct RestTransportFactory {
    /// Transport configuration.
    config: RestTransportConfig,
}

impl RestTransportFactory {
    /// Creates a factory with the given configuration.
    #[must_use]
    pub const fn new(config: RestTransportConfig) -> Self {
        Self {
            config,
        }
    }
}

#[async_trait]
impl TransportFactory for RestTransportFactory {
    async fn connect(
        &self,
        device: &Device,
        credential: &Credential,
        secret: &SecretMaterial,
        timeout_seconds: u64,
    ) -> Result<Box<dyn DeviceTransport>, TransportError> {
        let base = base_url(&device.management_address, self.config.allow_http)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(self.config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|error| TransportError::Connect(format!("client build failed: {error}")))?;

        let mut transport = RestTransport {
            client,
            base,
            username: credential.username.clone(),
            password: secret.clone(),
            timeout_millis: timeout_seconds.saturating_mul(1_000),
            closed: false,
        };
        // Authenticate eagerly so unreachable devices fail at connect time.
        transport.get("system/resource").await.map_err(|error| match error {
            TransportError::Timeout(millis) => TransportError::Timeout(millis),
            other => TransportError::Connect(other.to_string()),
        })?;
        Ok(Box::new(transport))
    }
}

/// Builds and validates the device base URL.
fn base_url(management_address: &str, allow_http: bool) -> Result<Url, TransportError> {
    let raw = if management_address.contains("://") {
        format!("{management_address}/rest/")
    } else {
        format!("https://{management_address}/rest/")
    };
    let url = Url::parse(&raw)
        .map_err(|error| TransportError::Connect(format!("invalid management address: {error}")))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if allow_http => Ok(url),
        scheme => Err(TransportError::Connect(format!("scheme '{scheme}' not permitted"))),
    }
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// REST transport bound to one device and credential.
#[derive(Debug)]
pub struct RestTransport {
    /// HTTP client with timeout and redirect policy applied.
    client: Client,
    /// Device base URL ending in `/rest/`.
    base: Url,
    /// Basic auth username.
    username: String,
    /// Basic auth password; zeroizes when the transport drops.
    password: SecretMaterial,
    /// Read timeout reported in timeout errors.
    timeout_millis: u64,
    /// Whether the transport was closed.
    closed: bool,
}

impl RestTransport {
    /// Fails closed when the transport was already closed.
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Resolves a resource path against the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|error| TransportError::Protocol(format!("invalid path '{path}': {error}")))
    }

    /// Maps a reqwest error onto the transport taxonomy.
    fn map_error(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout_millis)
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Protocol(error.to_string())
        }
    }

    /// Converts a response into JSON, surfacing error statuses.
    async fn into_json(&self, response: Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        response.json::<Value>().await.map_err(|error| self.map_error(&error))
    }
}

#[async_trait]
impl DeviceTransport for RestTransport {
    async fn get(&mut self, path: &str) -> Result<Value, TransportError> {
        self.ensure_open()?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .send()
            .await
            .map_err(|error| self.map_error(&error))?;
        self.into_json(response).await
    }

    async fn post(&mut self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.ensure_open()?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .json(body)
            .send()
            .await
            .map_err(|error| self.map_error(&error))?;
        self.into_json(response).await
    }

    async fn patch(&mut self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.ensure_open()?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .patch(url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .json(body)
            .send()
            .await
            .map_err(|error| self.map_error(&error))?;
        self.into_json(response).await
    }

    async fn delete(&mut self, path: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .delete(url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .send()
            .await
            .map_err(|error| self.map_error(&error))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
            })
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
