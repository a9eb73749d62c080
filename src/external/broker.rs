//! RabbitMQ management API client used to clean up after agent runs.
//!
//! Agents hold exclusive queues; if those survive a shutdown the next run
//! fails with `RESOURCE_LOCKED`. Cleanup deletes the configured queues and then
//! force-closes every open connection.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ToolError;

/// Default management API base, including the `/rabbitmq` path prefix.
pub const DEFAULT_API_BASE: &str = "http://localhost:15672/rabbitmq/api";

/// Environment variable overriding the configured password.
pub const PASSWORD_ENV: &str = "RABBITMQ_PASSWORD";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the management API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub api_base: String,
    pub username: String,
    pub password: String,
    pub vhost: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Applies `RABBITMQ_PASSWORD` when set.
    pub fn with_env_password(mut self) -> Self {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.password = password;
            }
        }
        self
    }
}

/// An open broker connection as listed by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInfo {
    pub name: String,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub deleted_queues: usize,
    pub closed_connections: usize,
    pub errors: Vec<String>,
}

impl CleanupReport {
    /// True when no call failed.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Thin client over the management HTTP API.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    client: Client,
    config: BrokerConfig,
}

impl BrokerClient {
    pub fn new(config: BrokerConfig) -> Result<Self, ToolError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Deletes a queue in the configured vhost.
    ///
    /// Returns `false` if the queue did not exist.
    pub async fn delete_queue(&self, name: &str) -> Result<bool, ToolError> {
        let path = format!(
            "/queues/{}/{}",
            urlencoding::encode(&self.config.vhost),
            urlencoding::encode(name)
        );
        self.delete(&path).await
    }

    /// Lists open connections.
    pub async fn list_connections(&self) -> Result<Vec<ConnectionInfo>, ToolError> {
        let response = self.request(Method::GET, "/connections").send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ToolError::ApiError {
                code: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Force-closes a connection by name.
    ///
    /// Returns `false` if the connection was already gone.
    pub async fn close_connection(&self, name: &str) -> Result<bool, ToolError> {
        let path = format!("/connections/{}", urlencoding::encode(name));
        self.delete(&path).await
    }

    /// Deletes `queues`, then closes all connections.
    ///
    /// Individual failures are collected in the report instead of aborting.
    pub async fn cleanup(&self, queues: &[String]) -> CleanupReport {
        let mut report = CleanupReport::default();

        for queue in queues {
            match self.delete_queue(queue).await {
                Ok(true) => {
                    debug!(queue = %queue, "Queue deleted");
                    report.deleted_queues += 1;
                }
                Ok(false) => debug!(queue = %queue, "Queue not found"),
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Failed to delete queue");
                    report.errors.push(format!("queue {queue}: {e}"));
                }
            }
        }

        match self.list_connections().await {
            Ok(connections) => {
                for connection in connections {
                    match self.close_connection(&connection.name).await {
                        Ok(true) => report.closed_connections += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(connection = %connection.name, error = %e, "Failed to close connection");
                            report
                                .errors
                                .push(format!("connection {}: {e}", connection.name));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list connections");
                report.errors.push(format!("connections: {e}"));
            }
        }

        info!(
            deleted_queues = report.deleted_queues,
            closed_connections = report.closed_connections,
            errors = report.errors.len(),
            "Broker cleanup finished"
        );
        report
    }

    async fn delete(&self, path: &str) -> Result<bool, ToolError> {
        let response = self.request(Method::DELETE, path).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ToolError::ApiError {
                code: status.as_u16(),
                message,
            });
        }
        Ok(true)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned response per accepted connection and returns the
    /// request lines it saw.
    async fn serve(responses: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                seen.push(request.lines().next().unwrap_or_default().to_string());
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            seen
        });

        (base, handle)
    }

    fn client(base: &str) -> BrokerClient {
        BrokerClient::new(BrokerConfig {
            api_base: base.to_string(),
            ..BrokerConfig::default()
        })
        .unwrap()
    }

    const NO_CONTENT: &str = "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n";
    const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.vhost, "/");
    }

    #[tokio::test]
    async fn test_delete_queue_encodes_vhost_and_treats_404_as_absent() {
        let (base, handle) = serve(vec![NO_CONTENT, NOT_FOUND]).await;
        let broker = client(&base);

        assert!(broker.delete_queue("brainstorm.worker-1").await.unwrap());
        assert!(!broker.delete_queue("missing").await.unwrap());

        let seen = handle.await.unwrap();
        assert_eq!(seen[0], "DELETE /api/queues/%2F/brainstorm.worker-1 HTTP/1.1");
        assert_eq!(seen[1], "DELETE /api/queues/%2F/missing HTTP/1.1");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let (base, _handle) = serve(vec![
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 12\r\nConnection: close\r\n\r\nnot allowed!",
        ])
        .await;

        let err = client(&base).delete_queue("q").await.unwrap_err();
        assert!(matches!(err, ToolError::ApiError { code: 401, .. }));
    }

    #[tokio::test]
    async fn test_cleanup_closes_listed_connections() {
        let body = r#"[{"name":"127.0.0.1:5000 -> 127.0.0.1:5672","user":"guest"}]"#;
        let list: &'static str = Box::leak(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .into_boxed_str(),
        );
        let (base, handle) = serve(vec![NO_CONTENT, NOT_FOUND, list, NO_CONTENT]).await;

        let report = client(&base)
            .cleanup(&["a".to_string(), "b".to_string()])
            .await;

        assert_eq!(report.deleted_queues, 1);
        assert_eq!(report.closed_connections, 1);
        assert!(report.success());

        let seen = handle.await.unwrap();
        assert_eq!(seen[2], "GET /api/connections HTTP/1.1");
        assert!(seen[3].starts_with("DELETE /api/connections/127.0.0.1%3A5000%20-%3E%20127.0.0.1%3A5672"));
    }

    #[tokio::test]
    async fn test_cleanup_collects_errors_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        drop(listener);

        let report = client(&base).cleanup(&["a".to_string()]).await;
        assert_eq!(report.deleted_queues, 0);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.success());
    }
}
