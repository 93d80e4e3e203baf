//! Server IPC – HTTP Client
//! ========================
//!
//! Thin wrapper around [`ureq`] that provides [`HttpClient`], the transport
//! behind both the readiness probe and [`crate::SearchClient`].
//!
//! * **Global timeout** – One limit applies to the *entire* request: connect +
//!   read + write. The readiness probe uses a short one so a half-started JVM
//!   cannot stall the poll loop.
//! * **Status codes are data** – Non-2xx responses are read like any other,
//!   and their body becomes the message of [`ClientError::Remote`].
//! * **Raw-byte interface** – JSON helpers come from
//!   [`ServerClientExt`](super::ServerClientExt); this module stays
//!   transport-only.

use std::{io, io::Read, time::Duration};

use ureq::Agent;

pub use super::ServerClient;
use super::error::*;

/// Request timeout for general use.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for a single readiness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest remote error body kept in [`ClientError::Remote`].
const MAX_ERROR_BODY: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verb {
    Get,
    Put,
    Post,
    Delete,
}

/// Lightweight HTTP/1.1 client backed by [`ureq`].
///
/// Cloning shares the same connection-pool, so it is cheap and thread-safe.
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: Agent,
    /// Prefix shared by every request, e.g. `http://127.0.0.1:9200`.
    base_url: String,
    pub host: String,
    pub port: u16,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let agent = Agent::new_with_config(
            Agent::config_builder()
                .timeout_global(Some(timeout))
                .http_status_as_error(false)
                .build(),
        );
        let client = Self {
            base_url: format!("http://{host}:{port}"),
            host: host.to_string(),
            port,
            agent,
            timeout,
        };
        crate::trace!("Client created: {client}");
        client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One readiness check: `GET /` answered with a 2xx status.
    ///
    /// Connection refused, resets, timeouts and error statuses all mean
    /// "not ready yet".
    pub fn probe(&self) -> bool {
        match self.get_raw("/") {
            Ok(_) => true,
            Err(e) => {
                crate::trace!("{} not ready: {e}", self.base_url);
                false
            }
        }
    }

    /// Performs the request and maps *ureq* errors to [`ClientError`].
    fn send(&self, verb: Verb, path: &str, body: Option<&[u8]>) -> Result<Vec<u8>> {
        debug_assert!(path.starts_with('/'));
        let url = format!("{}{}", self.base_url, path);

        let response = match (verb, body) {
            (Verb::Get, _) => self.agent.get(&url).call(),
            (Verb::Delete, _) => self.agent.delete(&url).call(),

            (Verb::Put, Some(b)) if !b.is_empty() => self
                .agent
                .put(&url)
                .content_type("application/json")
                .send(b),
            (Verb::Put, _) => self.agent.put(&url).send_empty(),

            (Verb::Post, Some(b)) if !b.is_empty() => self
                .agent
                .post(&url)
                .content_type("application/json")
                .send(b),
            (Verb::Post, _) => self.agent.post(&url).send_empty(),
        };

        match response {
            Ok(resp) => {
                let code = resp.status().as_u16();
                let reason = resp.status().canonical_reason().unwrap_or("unknown error");
                let mut bytes = Vec::new();
                resp.into_body().into_reader().read_to_end(&mut bytes)?;
                if (200..300).contains(&code) {
                    return Ok(bytes);
                }
                let message = if bytes.is_empty() {
                    reason.to_string()
                } else {
                    let mut text = String::from_utf8_lossy(&bytes).into_owned();
                    if text.len() > MAX_ERROR_BODY {
                        let mut cut = MAX_ERROR_BODY;
                        while !text.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        text.truncate(cut);
                    }
                    text
                };
                Err(ClientError::Remote { code, message })
            }

            Err(ureq::Error::StatusCode(code)) => Err(ClientError::Remote {
                code,
                message: format!("HTTP {code}"),
            }),

            Err(ureq::Error::Timeout(_)) => Err(ClientError::Timeout(self.timeout)),

            Err(ureq::Error::Io(e)) => Err(ClientError::Io(e)),

            Err(ureq::Error::Protocol(p)) => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("protocol error: {p}"),
            ))),

            Err(ureq::Error::BadUri(u)) => Err(ClientError::Setup {
                reason: format!("bad URI: {u}"),
            }),

            Err(other) => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("ureq error: {other}"),
            ))),
        }
    }
}

impl std::fmt::Display for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HttpClient({})", self.base_url)
    }
}

impl ServerClient for HttpClient {
    fn get_raw(&self, path: &str) -> Result<Vec<u8>> {
        self.send(Verb::Get, path, None)
    }

    fn put_raw(&self, path: &str, body: &[u8]) -> Result<Vec<u8>> {
        self.send(Verb::Put, path, Some(body))
    }

    fn post_raw(&self, path: &str, body: &[u8]) -> Result<Vec<u8>> {
        self.send(Verb::Post, path, Some(body))
    }

    fn delete_raw(&self, path: &str) -> Result<Vec<u8>> {
        self.send(Verb::Delete, path, None)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use serde_json::json;

    use super::*;
    use crate::server::ipc::ServerClientExt;

    fn client_for(server: &mockito::Server) -> HttpClient {
        let addr = server.socket_address();
        HttpClient::new(&addr.ip().to_string(), addr.port(), Duration::from_secs(5))
    }

    #[test]
    fn response_scenarios() {
        let mut server = mockito::Server::new();
        let ok = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"cluster_name":"c","version":{"number":"7.9.0"}}"#)
            .create();
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"error":{"type":"index_not_found_exception"},"status":404}"#)
            .create();
        let bare_500 = server.mock("GET", "/boom").with_status(500).create();

        let client = client_for(&server);

        let got: serde_json::Value = client.get("/").unwrap();
        assert_eq!(got["version"]["number"], "7.9.0");

        match client.get::<serde_json::Value>("/missing").unwrap_err() {
            ClientError::Remote { code, message } => {
                assert_eq!(code, 404);
                assert!(message.contains("index_not_found_exception"));
            }
            other => panic!("expected Remote, got {other:?}"),
        }

        let err = client.get_raw("/boom").unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("Internal Server Error"));

        ok.assert();
        missing.assert();
        bare_500.assert();
    }

    #[test]
    fn verbs_send_json_bodies() {
        let mut server = mockito::Server::new();
        let put = server
            .mock("PUT", "/books")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"settings": {}})))
            .with_body(r#"{"acknowledged":true}"#)
            .create();
        let post = server
            .mock("POST", "/books/_refresh")
            .with_body(r#"{"_shards":{"total":1}}"#)
            .create();
        let delete = server
            .mock("DELETE", "/books")
            .with_body(r#"{"acknowledged":true}"#)
            .create();

        let client = client_for(&server);
        let v: serde_json::Value = client.put("/books", &json!({"settings": {}})).unwrap();
        assert_eq!(v, json!({"acknowledged": true}));
        client.post_raw("/books/_refresh", &[]).unwrap();
        let v: serde_json::Value = client.delete("/books").unwrap();
        assert_eq!(v["acknowledged"], true);

        put.assert();
        post.assert();
        delete.assert();
    }

    #[test]
    fn invalid_json_is_serde_error() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/").with_body("not json").create();
        let client = client_for(&server);
        assert!(matches!(
            client.get::<serde_json::Value>("/"),
            Err(ClientError::Serde(_))
        ));
    }

    #[test]
    fn probe_reflects_status() {
        let mut server = mockito::Server::new();
        let client = client_for(&server);

        let unavailable = server.mock("GET", "/").with_status(503).create();
        assert!(!client.probe());
        unavailable.remove();

        let _ready = server.mock("GET", "/").with_status(200).create();
        assert!(client.probe());
    }

    #[test]
    fn probe_refused_connection_is_not_ready() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = HttpClient::new("127.0.0.1", port, PROBE_TIMEOUT);
        assert!(!client.probe());
        assert!(matches!(client.get_raw("/"), Err(ClientError::Io(_))));
    }
}
