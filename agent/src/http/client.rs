//! HTTP client implementation

use std::sync::RwLock;
use std::time::Duration;

use api_models::models::ErrorResponse;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::AgentError;

/// Session template used for API key authentication
const API_KEY_TEMPLATE: &str = "session-template/api-key";

/// HTTP client for control-plane communication
pub struct HttpClient {
    client: Client,
    base_url: String,
    session_id: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CreatedResponse {
    resource_id: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AgentError> {
        Url::parse(base_url)
            .map_err(|e| AgentError::ConfigError(format!("invalid base URL {}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: RwLock::new(None),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check(method: &str, url: &str, response: Response) -> Result<Response, AgentError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        error!("HTTP {} {} failed: {} - {}", method, url, status, message);

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::NotFound(format!("{}: {}", url, message)));
        }
        Err(AgentError::ControlPlaneError(format!("{}: {}", status, message)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        url: String,
        request: RequestBuilder,
    ) -> Result<T, AgentError> {
        debug!("{} {}", method, url);
        let response = request.send().await?;
        let response = Self::check(method, &url, response).await?;
        Ok(response.json().await?)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AgentError> {
        let url = self.url(path);
        let request = self.client.get(&url).query(query);
        self.send("GET", url, request).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        let url = self.url(path);
        let request = self.client.post(&url).json(body);
        self.send("POST", url, request).await
    }

    /// Make a PUT request, `select` limits the fields the server updates
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        select: &[&str],
        body: &B,
    ) -> Result<T, AgentError> {
        let url = self.url(path);
        let mut request = self.client.put(&url).json(body);
        if !select.is_empty() {
            request = request.query(&[("select", select.join(","))]);
        }
        self.send("PUT", url, request).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), AgentError> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let response = self.client.delete(&url).send().await?;
        Self::check("DELETE", &url, response).await?;
        Ok(())
    }

    /// Open a session with an API key pair; the session cookie is kept by the client
    pub async fn login(&self, key: &str, secret: &SecretString) -> Result<(), AgentError> {
        let body = serde_json::json!({
            "template": {
                "href": API_KEY_TEMPLATE,
                "key": key,
                "secret": secret.expose_secret(),
            }
        });

        let created: CreatedResponse = self.post("session", &body).await.map_err(|e| {
            AgentError::ControlPlaneError(format!("login failed: {}", e))
        })?;

        info!("Logged in to control plane ({})", created.resource_id);
        let mut session = self.session_id.write().unwrap_or_else(|e| e.into_inner());
        *session = Some(created.resource_id);
        Ok(())
    }

    /// Close the current session, if any
    pub async fn logout(&self) -> Result<(), AgentError> {
        let session = {
            let mut session = self.session_id.write().unwrap_or_else(|e| e.into_inner());
            session.take()
        };

        if let Some(session_id) = session {
            self.delete(&session_id).await?;
            info!("Logged out of control plane");
        }
        Ok(())
    }
}
