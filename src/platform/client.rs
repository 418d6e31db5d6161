use crate::config::Config;
use crate::error::{InspectorError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::EntityState;

/// Timeout applied to every platform request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only operations consumed from the automation platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// List every entity state.
    async fn list_states(&self) -> Result<Vec<EntityState>>;

    /// Fetch one automation's configuration by numeric id or slug.
    ///
    /// `Ok(None)` means the platform answered not-found or forbidden.
    async fn fetch_automation_config(&self, key: &str) -> Result<Option<String>>;
}

/// Platform API client (Home Assistant REST API behind the Supervisor proxy)
///
/// Every request carries the bearer token and is bounded by [`FETCH_TIMEOUT`].
pub struct HomeAssistantClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HomeAssistantClient {
    /// Create a client from configuration, reading the token from the configured env var.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config
            .platform_token()
            .map_err(|e| InspectorError::Config(e.to_string()))?;
        Self::with_base_url(token, config.platform.base_url.clone())
    }

    /// Create a client against an explicit base URL
    pub fn with_base_url(token: String, base_url: String) -> Result<Self> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl PlatformApi for HomeAssistantClient {
    async fn list_states(&self) -> Result<Vec<EntityState>> {
        let response = self.get("/api/states").await?;
        let status = response.status();

        if !status.is_success() {
            return Err(InspectorError::Platform(format!(
                "GET /api/states returned {}",
                status
            )));
        }

        let body = response.text().await?;
        let states: Vec<EntityState> = serde_json::from_str(&body)?;
        Ok(states)
    }

    async fn fetch_automation_config(&self, key: &str) -> Result<Option<String>> {
        let path = format!("/api/config/automation/config/{}", key);
        let response = self.get(&path).await?;
        let status = response.status();

        match status {
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                log::debug!("GET {} returned {}", path, status);
                Ok(None)
            }
            s if !s.is_success() => Err(InspectorError::Platform(format!(
                "GET {} returned {}",
                path, s
            ))),
            _ => Ok(Some(response.text().await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_list_states() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {
                        "entity_id": "sensor.kitchen_temp",
                        "state": "21.5",
                        "attributes": {"friendly_name": "Kitchen temperature"},
                        "last_changed": "2024-05-01T10:00:00+00:00"
                    },
                    {
                        "entity_id": "automation.test",
                        "state": "on",
                        "attributes": {"id": "1684872402573"}
                    }
                ]"#,
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::with_base_url("test_token".to_string(), server.url()).unwrap();
        let states = client.list_states().await.unwrap();

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].entity_id, "sensor.kitchen_temp");
        assert_eq!(states[0].friendly_name(), Some("Kitchen temperature"));
        assert_eq!(states[1].state, "on");
    }

    #[tokio::test]
    async fn test_list_states_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .with_status(500)
            .create_async()
            .await;

        let client = HomeAssistantClient::with_base_url("t".to_string(), server.url()).unwrap();
        let err = client.list_states().await.unwrap_err();
        assert!(matches!(err, InspectorError::Platform(_)));
    }

    #[tokio::test]
    async fn test_list_states_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .with_status(200)
            .with_body("<html>proxy error</html>")
            .create_async()
            .await;

        let client = HomeAssistantClient::with_base_url("t".to_string(), server.url()).unwrap();
        let err = client.list_states().await.unwrap_err();
        assert!(matches!(err, InspectorError::Json(_)));
    }

    #[tokio::test]
    async fn test_fetch_config_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/config/automation/config/1684872402573")
            .with_status(200)
            .with_body(r#"{"trigger": [{"platform": "state", "entity_id": "sensor.a"}]}"#)
            .create_async()
            .await;

        let client = HomeAssistantClient::with_base_url("t".to_string(), server.url()).unwrap();
        let body = client.fetch_automation_config("1684872402573").await.unwrap();
        assert!(body.unwrap().contains("sensor.a"));
    }

    #[tokio::test]
    async fn test_fetch_config_not_found_and_forbidden_are_none() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/api/config/automation/config/missing")
            .with_status(404)
            .create_async()
            .await;
        let _denied = server
            .mock("GET", "/api/config/automation/config/denied")
            .with_status(403)
            .create_async()
            .await;

        let client = HomeAssistantClient::with_base_url("t".to_string(), server.url()).unwrap();
        assert!(client.fetch_automation_config("missing").await.unwrap().is_none());
        assert!(client.fetch_automation_config("denied").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_config_server_error_is_err() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/config/automation/config/broken")
            .with_status(502)
            .create_async()
            .await;

        let client = HomeAssistantClient::with_base_url("t".to_string(), server.url()).unwrap();
        assert!(client.fetch_automation_config("broken").await.is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            HomeAssistantClient::with_base_url("t".to_string(), "http://supervisor/core/".to_string()).unwrap();
        assert_eq!(client.base_url(), "http://supervisor/core");
    }
}
