use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{FeedbackOutput, RubricStep};

pub const FEEDBACK_CREATED: &str = "FeedbackCreated";
const DEFAULT_SERVER_URL: &str = "http://localhost:8002";

/// Event-bus capability; `Ok(false)` means the bus refused the event
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, session_id: &str, event_type: &str, payload: &Value) -> Result<bool>;
}

/// Payload of a `FeedbackCreated` event
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackCreated<'a> {
    pub session_id: &'a str,
    pub step_focus: RubricStep,
    pub feedback: &'a FeedbackOutput,
}

impl FeedbackCreated<'_> {
    pub fn to_payload(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::json("serializing a FeedbackCreated event", e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    pub enabled: bool,
    pub server_url: String,
    pub timeout: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl PublishConfig {
    /// `ASYNCAPI_ENABLE=1` turns publishing on; `ASYNCAPI_SERVER_URL` overrides the server
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("ASYNCAPI_ENABLE").ok().as_deref(),
            std::env::var("ASYNCAPI_SERVER_URL").ok().as_deref(),
        )
    }

    fn from_vars(enable: Option<&str>, server_url: Option<&str>) -> Self {
        let mut config = Self {
            enabled: enable.map(str::trim) == Some("1"),
            ..Self::default()
        };
        if let Some(url) = server_url.filter(|u| !u.trim().is_empty()) {
            config.server_url = url.trim().to_string();
        }
        config
    }
}

/// POSTs `{"type": <event>, ...payload}` to `<server>/publish/<session_id>`
pub struct HttpPublisher {
    client: Client,
    server_url: Url,
}

impl HttpPublisher {
    pub fn new(config: &PublishConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Self::with_client(client, &config.server_url)
    }

    fn with_client(client: Client, server_url: &str) -> Result<Self> {
        let server_url = Url::parse(server_url.trim())
            .map_err(|e| Error::config(format!("invalid event server URL {:?}: {}", server_url, e)))?;
        if server_url.cannot_be_a_base() {
            return Err(Error::config(format!("event server URL {:?} cannot take a path", server_url.as_str())));
        }
        Ok(Self { client, server_url })
    }

    /// `<server>/publish/<session_id>` with the session id as one encoded path segment
    fn event_url(&self, session_id: &str) -> Result<Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("event server URL {:?} cannot take a path", self.server_url.as_str())))?
            .pop_if_empty()
            .push("publish")
            .push(session_id);
        Ok(url)
    }
}

fn event_message(event_type: &str, payload: &Value) -> Value {
    let mut message = Map::new();
    message.insert("type".to_string(), Value::String(event_type.to_string()));
    match payload {
        Value::Object(fields) => {
            for (key, value) in fields {
                message.insert(key.clone(), value.clone());
            }
        }
        other => {
            message.insert("payload".to_string(), other.clone());
        }
    }
    Value::Object(message)
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, session_id: &str, event_type: &str, payload: &Value) -> Result<bool> {
        let url = self.event_url(session_id)?;
        debug!("Publishing {} to {}", event_type, url);

        let response = self
            .client
            .post(url)
            .json(&event_message(event_type, payload))
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("publishing {} failed: {}", event_type, e)))?;

        let status = response.status();
        if !status.is_success() {
            debug!("Event bus answered {} for {}", status, event_type);
        }
        Ok(status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// One-shot HTTP server answering `status`; resolves to the raw request
    async fn serve_once(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!("HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status);
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    fn publisher(url: &str) -> HttpPublisher {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpPublisher::with_client(client, &format!("{}/", url)).unwrap()
    }

    #[test]
    fn test_config_from_vars() {
        let off = PublishConfig::from_vars(None, None);
        assert!(!off.enabled);
        assert_eq!(off.server_url, DEFAULT_SERVER_URL);
        assert_eq!(off.timeout, Duration::from_secs(5));

        let on = PublishConfig::from_vars(Some("1"), Some("http://bus:9000"));
        assert!(on.enabled);
        assert_eq!(on.server_url, "http://bus:9000");

        assert!(!PublishConfig::from_vars(Some("true"), None).enabled);
    }

    #[test]
    fn test_event_message_flattens_payload() {
        let message = event_message(FEEDBACK_CREATED, &serde_json::json!({"session_id": "abc", "step_focus": 11}));
        assert_eq!(message["type"], "FeedbackCreated");
        assert_eq!(message["session_id"], "abc");
        assert_eq!(message["step_focus"], 11);
    }

    #[tokio::test]
    async fn test_publish_posts_to_session_path() {
        let (url, server) = serve_once("200 OK").await;

        let delivered = publisher(&url)
            .publish("abc12345", FEEDBACK_CREATED, &serde_json::json!({"session_id": "abc12345"}))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(delivered);
        assert!(request.starts_with("POST /publish/abc12345 HTTP/1.1"));
        assert!(request.contains(r#""type":"FeedbackCreated""#));
    }

    #[test]
    fn test_event_url_encodes_session_id_as_one_segment() {
        let bus = publisher("http://bus:9000/api");

        let url = bus.event_url("a/b?c#d").unwrap();

        assert_eq!(url.as_str(), "http://bus:9000/api/publish/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_server_url_is_a_config_error() {
        let config = PublishConfig {
            enabled: true,
            server_url: "not a url".to_string(),
            ..PublishConfig::default()
        };
        assert!(matches!(HttpPublisher::new(&config), Err(Error::Config(_))));

        let client = Client::builder().no_proxy().build().unwrap();
        assert!(matches!(HttpPublisher::with_client(client, "mailto:bus@example.com"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_publish_sends_encoded_session_path() {
        let (url, server) = serve_once("200 OK").await;

        let delivered = publisher(&url)
            .publish("room 1/a?b", FEEDBACK_CREATED, &serde_json::json!({}))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(delivered);
        assert!(request.starts_with("POST /publish/room%201%2Fa%3Fb HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_publish_reports_rejection() {
        let (url, server) = serve_once("503 Service Unavailable").await;

        let delivered = publisher(&url)
            .publish("abc12345", FEEDBACK_CREATED, &serde_json::json!({}))
            .await
            .unwrap();
        server.await.unwrap();

        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_publish_unreachable_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = publisher(&url).publish("s", FEEDBACK_CREATED, &serde_json::json!({})).await;

        assert!(matches!(result, Err(Error::Persistence(_))));
    }
}
