use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::dag_flow::spec::JsonMap;
use crate::registry::Tool;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct HttpGetArgs {
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// HTTP GET returning the status code, the body (`json` or `text`) and
/// the response headers. Redirects are followed; a non-success status is
/// an error.
pub struct HttpGet {
    timeout: Duration,
}

impl HttpGet {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpGet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpGet {
    fn name(&self) -> &str {
        "http.get"
    }

    fn description(&self) -> &str {
        "Fetches a URL with GET and returns status, body and headers"
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["url"]
        }))
    }

    async fn run(&self, args: JsonMap) -> anyhow::Result<JsonMap> {
        let args: HttpGetArgs = serde_json::from_value(Value::Object(args))?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        let mut request = client.get(&args.url);
        for (name, value) in &args.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(url = %args.url, "GET");
        let response = request.send().await?.error_for_status()?;
        let status = response.status().as_u16();
        let headers: JsonMap = response
            .headers()
            .iter()
            .map(|(k, v)| {
                let value = String::from_utf8_lossy(v.as_bytes()).into_owned();
                (k.as_str().to_string(), Value::String(value))
            })
            .collect();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let mut out = JsonMap::new();
        out.insert("status_code".to_string(), json!(status));
        if is_json {
            out.insert("json".to_string(), response.json::<Value>().await?);
        } else {
            out.insert("text".to_string(), Value::String(response.text().await?));
        }
        out.insert("headers".to_string(), Value::Object(headers));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Serves exactly one canned HTTP/1.1 response and returns its base URL.
    async fn serve_once(status: &'static str, content_type: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn args(url: &str) -> JsonMap {
        json!({ "url": url }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn json_bodies_are_parsed() {
        let url = serve_once("200 OK", "application/json", r#"{"ok":true}"#).await;
        let out = HttpGet::new().run(args(&url)).await.unwrap();
        assert_eq!(out["status_code"], 200);
        assert_eq!(out["json"], json!({"ok": true}));
        assert_eq!(out["headers"]["content-type"], "application/json");
        assert!(!out.contains_key("text"));
    }

    #[tokio::test]
    async fn other_bodies_are_text() {
        let url = serve_once("200 OK", "text/plain", "hello").await;
        let out = HttpGet::new().run(args(&url)).await.unwrap();
        assert_eq!(out["text"], "hello");
        assert!(!out.contains_key("json"));
    }

    #[tokio::test]
    async fn error_status_fails() {
        let url = serve_once("404 Not Found", "text/plain", "missing").await;
        let err = HttpGet::new().run(args(&url)).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn url_is_required() {
        assert!(HttpGet::new().validate_args(&JsonMap::new()).is_err());
        let bad_headers = json!({"url": "http://x", "headers": {"a": 1}})
            .as_object()
            .cloned()
            .unwrap();
        assert!(HttpGet::new().validate_args(&bad_headers).is_err());
    }
}
