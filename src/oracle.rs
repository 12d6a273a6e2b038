//! Existence oracle: does a third-party chart already exist for a song?
//!
//! The HTTP implementation talks to a DataTables-style search endpoint. Calls
//! are strictly sequential with a fixed delay between them. Transient
//! failures are retried a bounded number of times; anything still failing is
//! reported as "does not exist" with a warning, never as an error.

use log::{debug, warn};
use serde::Deserialize;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Anything that can answer "does a chart for this song exist?".
pub trait ExistenceOracle {
    fn exists(&mut self, artist: &str, title: &str) -> bool;
}

/// Closures work as oracles, mostly for tests and dry runs.
impl<F> ExistenceOracle for F
where
    F: FnMut(&str, &str) -> bool,
{
    fn exists(&mut self, artist: &str, title: &str) -> bool {
        self(artist, title)
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Worth retrying: network trouble, rate limiting, server errors
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Transport(_) => true,
            OracleError::Status(code) => *code == 429 || *code >= 500,
            OracleError::Malformed(_) => false,
        }
    }
}

// ============================================================================
// Response Payload
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<SearchRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRow {
    #[serde(rename = "Artist", default)]
    pub artist: String,
    #[serde(rename = "Title", default)]
    pub title: String,
}

/// A response confirms the song when some row's artist contains the queried
/// artist and its title contains the queried title (case-insensitive).
pub fn response_confirms(response: &SearchResponse, artist: &str, title: &str) -> bool {
    let artist = artist.to_lowercase();
    let title = title.to_lowercase();
    response
        .data
        .iter()
        .any(|row| row.artist.to_lowercase().contains(&artist) && row.title.to_lowercase().contains(&title))
}

// ============================================================================
// Throttle
// ============================================================================

/// Enforces a fixed minimum interval between consecutive calls.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_call: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    /// Sleep until the interval since the previous call has passed.
    /// Must be called *before* making a request.
    pub fn wait_turn(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!("Rate limiting: waiting {:.1}s", wait.as_secs_f64());
                thread::sleep(wait);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

// ============================================================================
// HTTP Oracle
// ============================================================================

#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub endpoint: String,
    pub delay: Duration,
    pub max_retries: u32,
    pub timeout: Duration,
    pub page_size: u32,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://ignition4.customsforge.com/tablesettings".to_string(),
            delay: Duration::from_secs(1),
            max_retries: 3,
            timeout: Duration::from_secs(15),
            page_size: 10,
        }
    }
}

pub struct HttpOracle {
    agent: ureq::Agent,
    settings: OracleSettings,
    throttle: Throttle,
}

impl HttpOracle {
    pub fn new(settings: OracleSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self {
            agent,
            throttle: Throttle::new(settings.delay),
            settings,
        }
    }

    fn search(&mut self, artist: &str, title: &str) -> Result<SearchResponse, OracleError> {
        self.throttle.wait_turn();

        let query = format!("{} {}", artist, title);
        let length = self.settings.page_size.to_string();
        let form = [
            ("draw", "1"),
            ("columns[0][data]", "Add"),
            ("columns[0][name]", ""),
            ("columns[0][searchable]", "true"),
            ("columns[0][orderable]", "false"),
            ("columns[0][search][value]", ""),
            ("columns[0][search][regex]", "false"),
            ("search[value]", query.as_str()),
            ("search[regex]", "false"),
            ("start", "0"),
            ("length", length.as_str()),
        ];

        let response = match self.agent.post(&self.settings.endpoint).send_form(&form) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(OracleError::Status(code)),
            Err(ureq::Error::Transport(t)) => return Err(OracleError::Transport(t.to_string())),
        };
        let body = response
            .into_string()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))
    }

    /// Query with bounded retries on transient failures.
    pub fn check(&mut self, artist: &str, title: &str) -> Result<bool, OracleError> {
        let mut attempt = 0;
        loop {
            match self.search(artist, title) {
                Ok(response) => return Ok(response_confirms(&response, artist, title)),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    debug!(
                        "Oracle lookup for {} - {} failed ({}), retry {}/{}",
                        artist, title, e, attempt, self.settings.max_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl ExistenceOracle for HttpOracle {
    fn exists(&mut self, artist: &str, title: &str) -> bool {
        match self.check(artist, title) {
            Ok(found) => found,
            Err(e) => {
                warn!("Existence check failed for {} - {}: {}; treating as not found", artist, title, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_response_confirms_substring_match() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"data":[{"Artist":"The Strokes","Title":"Heart In A Cage (Live)"},{"Artist":"Muse"}]}"#,
        )
        .unwrap();
        assert!(response_confirms(&response, "the strokes", "heart in a cage"));
        assert!(!response_confirms(&response, "the strokes", "reptilia"));
        assert!(!response_confirms(&response, "muse", "uprising"));
    }

    #[test]
    fn test_missing_data_field_is_empty() {
        let response: SearchResponse = serde_json::from_str(r#"{"draw":1}"#).unwrap();
        assert!(response.data.is_empty());
        assert!(!response_confirms(&response, "a", "b"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(OracleError::Transport("reset".into()).is_transient());
        assert!(OracleError::Status(503).is_transient());
        assert!(OracleError::Status(429).is_transient());
        assert!(!OracleError::Status(404).is_transient());
        assert!(!OracleError::Malformed("eof".into()).is_transient());
    }

    fn settings_for(endpoint: String, max_retries: u32) -> OracleSettings {
        OracleSettings {
            endpoint,
            delay: Duration::from_millis(1),
            max_retries,
            timeout: Duration::from_secs(2),
            page_size: 10,
        }
    }

    /// Local HTTP server answering every request with the same response.
    /// Returns its endpoint and a request counter.
    fn serve_fixed(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                let mut form = vec![0u8; content_length];
                let _ = reader.read_exact(&mut form);

                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (format!("http://{}/tablesettings", addr), hits)
    }

    #[test]
    fn test_unreachable_endpoint_is_negative() {
        let mut oracle = HttpOracle::new(OracleSettings {
            timeout: Duration::from_millis(200),
            ..settings_for("http://127.0.0.1:9/tablesettings".to_string(), 1)
        });
        assert!(!oracle.exists("Queen", "Bohemian Rhapsody"));
    }

    #[test]
    fn test_server_error_retried_then_negative() {
        let (endpoint, hits) = serve_fixed("500 Internal Server Error", "oops");
        let mut oracle = HttpOracle::new(settings_for(endpoint, 2));
        assert!(!oracle.exists("Queen", "Bohemian Rhapsody"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_client_error_not_retried() {
        let (endpoint, hits) = serve_fixed("404 Not Found", "");
        let mut oracle = HttpOracle::new(settings_for(endpoint, 2));
        assert!(!oracle.exists("Queen", "Bohemian Rhapsody"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_payload_is_negative_without_retry() {
        let (endpoint, hits) = serve_fixed("200 OK", "<html>not json</html>");
        let mut oracle = HttpOracle::new(settings_for(endpoint, 2));
        assert!(!oracle.exists("Queen", "Bohemian Rhapsody"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_confirming_payload_is_positive() {
        let (endpoint, hits) = serve_fixed(
            "200 OK",
            r#"{"data":[{"Artist":"Queen","Title":"Bohemian Rhapsody"}]}"#,
        );
        let mut oracle = HttpOracle::new(settings_for(endpoint, 2));
        assert!(oracle.exists("queen", "bohemian rhapsody"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_throttle_spaces_calls() {
        let mut throttle = Throttle::new(Duration::from_millis(30));
        let start = Instant::now();
        throttle.wait_turn();
        throttle.wait_turn();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_closure_oracle() {
        let mut calls = 0;
        let mut oracle = |artist: &str, _title: &str| {
            calls += 1;
            artist == "Muse"
        };
        assert!(oracle.exists("Muse", "Uprising"));
        assert!(!ExistenceOracle::exists(&mut oracle, "Blur", "Song 2"));
        drop(oracle);
        assert_eq!(calls, 2);
    }
}
