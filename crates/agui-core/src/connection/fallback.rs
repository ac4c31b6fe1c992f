//! Request/response transport used while the channel is unavailable.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::FallbackError;

/// Blocking request/response transport.
///
/// Implementations are called from `spawn_blocking`, never from an async
/// context directly.
pub trait FallbackTransport: Send + Sync {
    /// POST `body` as JSON to `path`. `Ok(None)` means an empty reply body.
    fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>, FallbackError>;

    /// GET `path` and succeed on any 2xx status.
    fn get(&self, path: &str) -> Result<(), FallbackError>;
}

/// [`FallbackTransport`] over HTTP using `ureq`.
pub struct HttpFallback {
    config: SessionConfig,
    agent: ureq::Agent,
}

impl HttpFallback {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_timeout(config, config.request_timeout)
    }

    pub fn with_timeout(config: &SessionConfig, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            config: config.clone(),
            agent,
        }
    }
}

fn map_ureq_error(err: ureq::Error) -> FallbackError {
    match err {
        ureq::Error::Status(status, response) => FallbackError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => FallbackError::Unreachable(transport.to_string()),
    }
}

impl FallbackTransport for HttpFallback {
    fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>, FallbackError> {
        let url = self.config.endpoint(path);
        log::debug!("Fallback POST {}", url);

        let response = self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .send_json(body)
            .map_err(map_ureq_error)?;

        let text = response
            .into_string()
            .map_err(|e| FallbackError::InvalidBody(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| FallbackError::InvalidBody(e.to_string()))
    }

    fn get(&self, path: &str) -> Result<(), FallbackError> {
        let url = self.config.endpoint(path);
        log::debug!("Fallback GET {}", url);
        self.agent.get(&url).call().map_err(map_ureq_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve exactly one HTTP request with a canned response, returning the
    /// raw request text. Test scaffolding only: one connection, no chunked
    /// bodies, no keep-alive.
    fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (base, handle)
    }

    /// Read headers and a body sized by a single `Content-Length` header.
    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    #[test]
    fn post_returns_parsed_reply() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"type":"ai_response","content":"hello","conversationId":"X","streaming":false}"#,
        );
        let transport = HttpFallback::new(&SessionConfig::new(base));

        let reply = transport
            .post("/agui/message", &serde_json::json!({"type": "user_message"}))
            .unwrap()
            .unwrap();
        assert_eq!(reply["content"], "hello");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /agui/message "));
    }

    #[test]
    fn post_empty_body_is_none() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", "");
        let transport = HttpFallback::new(&SessionConfig::new(base));

        let reply = transport
            .post("/agui/visualization", &serde_json::json!({}))
            .unwrap();
        assert!(reply.is_none());
        server.join().unwrap();
    }

    #[test]
    fn error_status_maps_to_status_error() {
        let (base, server) = serve_once("HTTP/1.1 503 Service Unavailable", "busy");
        let transport = HttpFallback::new(&SessionConfig::new(base));

        let err = transport.get("/health").unwrap_err();
        assert!(matches!(err, FallbackError::Status { status: 503, ref body } if body == "busy"));
        server.join().unwrap();
    }

    #[test]
    fn unreachable_backend_maps_to_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpFallback::with_timeout(
            &SessionConfig::new(format!("http://127.0.0.1:{}", port)),
            Duration::from_secs(2),
        );

        let err = transport.get("/health").unwrap_err();
        assert!(matches!(err, FallbackError::Unreachable(_)));
    }
}
