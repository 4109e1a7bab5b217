//! Minimal in-process HTTP server for tests.
//!
//! Serves canned responses from a background thread on an ephemeral
//! localhost port. Compiled into the crate (like the other test-support
//! modules) so both unit and integration tests can drive mirror probing and
//! catalog fetches without a network.

use std::collections::HashMap;
use std::io::{BufRead as _, BufReader, Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// A canned HTTP response.
#[derive(Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Background HTTP listener with per-path canned responses.
pub struct TestServer {
    addr: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Serve `status`/`body` for every path.
    #[must_use]
    pub fn respond_with(status: u16, body: &[u8]) -> Self {
        Self::with_routes(HashMap::new(), CannedResponse {
            status,
            body: body.to_vec(),
        })
    }

    /// Serve per-path responses, with `fallback` for unknown paths.
    #[must_use]
    pub fn with_routes(routes: HashMap<String, CannedResponse>, fallback: CannedResponse) -> Self {
        #[allow(clippy::expect_used)]
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        #[allow(clippy::expect_used)]
        let addr = listener.local_addr().expect("local addr").to_string();
        let hits = Arc::new(AtomicUsize::new(0));

        let thread_hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                thread_hits.fetch_add(1, Ordering::SeqCst);
                let _ = handle(stream, &routes, &fallback);
            }
        });

        Self { addr, hits }
    }

    /// Absolute URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Base URL without a trailing slash, usable as a mirror prefix.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn handle(
    stream: TcpStream,
    routes: &HashMap<String, CannedResponse>,
    fallback: &CannedResponse,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    // Drain headers; requests in tests are bodiless GETs.
    let mut line = String::new();
    let mut content_length = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some(value) = line
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(str::trim)
        {
            content_length = value.parse().unwrap_or(0);
        }
    }
    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        let _ = reader.read_exact(&mut body);
    }

    let response = routes.get(&path).unwrap_or(fallback);
    let reason = match response.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let mut stream = reader.into_inner();
    write!(
        stream,
        "HTTP/1.1 {} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len()
    )?;
    stream.write_all(&response.body)?;
    stream.flush()
}
