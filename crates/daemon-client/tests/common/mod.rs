//! Common test utilities: an in-process fake daemon speaking just enough HTTP/1.1

#![allow(dead_code)]

use daemon_client::{Client, ClientConfig};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

/// API version the fake daemon reports
pub const FAKE_API_VERSION: &str = "1.41";

/// Install a test log subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A request received by the fake daemon
#[derive(Debug, Clone)]
pub struct Recorded {
    /// HTTP method
    pub method: String,
    /// Request target (path and query string)
    pub target: String,
    /// Headers with lowercased names
    pub headers: HashMap<String, String>,
    /// Decoded request body
    pub body: Vec<u8>,
}

impl Recorded {
    fn parsed(&self) -> reqwest::Url {
        reqwest::Url::parse(&format!("http://fake-daemon{}", self.target))
            .expect("request target should form a valid URL")
    }

    /// Request path without the query string
    pub fn path(&self) -> String {
        self.parsed().path().to_string()
    }

    /// Decoded value of a query parameter
    pub fn query(&self, key: &str) -> Option<String> {
        self.parsed()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// A canned response
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Reply {
    /// JSON response
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    /// Raw response body
    pub fn raw(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }

    /// Newline-delimited JSON build stream
    pub fn stream(lines: &[serde_json::Value]) -> Self {
        let mut body = String::new();
        for line in lines {
            body.push_str(&line.to_string());
            body.push_str("\r\n");
        }
        Self::raw(200, body)
    }

    /// Daemon-style error
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "message": message }))
    }
}

type Handler = dyn Fn(&Recorded) -> Reply + Send + Sync;

/// Fake daemon listening on a random local port
pub struct FakeDaemon {
    port: u16,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeDaemon {
    /// Start a daemon that answers `/version` and routes everything else to `handler`
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        Self::start_raw(move |req| {
            if req.path() == "/version" {
                Reply::json(
                    200,
                    serde_json::json!({ "ApiVersion": FAKE_API_VERSION, "Version": "24.0.7" }),
                )
            } else {
                handler(req)
            }
        })
    }

    /// Start a daemon that routes every request, `/version` included, to `handler`
    pub fn start_raw<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake daemon");
        let port = listener
            .local_addr()
            .expect("Failed to read fake daemon address")
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || serve(stream, handler, recorded));
            }
        });

        Self { port, requests }
    }

    /// Port the daemon listens on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client configuration pointed at this daemon
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port)
    }

    /// Connected client using default settings
    pub fn client(&self) -> Client {
        Client::from_config(self.config()).expect("Failed to connect to fake daemon")
    }

    /// Connected client that stages build files under `staging`
    pub fn client_staging_in(&self, staging: &Path) -> Client {
        let config = ClientConfig {
            staging_dir: Some(staging.to_path_buf()),
            ..self.config()
        };
        Client::from_config(config).expect("Failed to connect to fake daemon")
    }

    /// Requests received so far, excluding version negotiation
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .iter()
            .filter(|r| r.path() != "/version")
            .cloned()
            .collect()
    }
}

fn serve(stream: TcpStream, handler: Arc<Handler>, recorded: Arc<Mutex<Vec<Recorded>>>) {
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);

    let Some(request) = read_request(&mut reader) else {
        return;
    };
    recorded
        .lock()
        .expect("request log poisoned")
        .push(request.clone());

    let reply = handler(&request);
    let head = format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    let _ = writer.write_all(head.as_bytes());
    let _ = writer.write_all(&reply.body);
    let _ = writer.flush();
}

fn read_request(reader: &mut BufReader<TcpStream>) -> Option<Recorded> {
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let chunked = headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let body = if chunked {
        read_chunked(reader)?
    } else {
        let length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        reader.read_exact(&mut body).ok()?;
        body
    };

    Some(Recorded {
        method,
        target,
        headers,
        body,
    })
}

fn read_chunked(reader: &mut BufReader<TcpStream>) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).ok()?;
        let size_hex = size_line.trim().split(';').next()?;
        let size = usize::from_str_radix(size_hex, 16).ok()?;
        if size == 0 {
            let mut trailer = String::new();
            reader.read_line(&mut trailer).ok()?;
            return Some(body);
        }
        let mut chunk = vec![0; size];
        reader.read_exact(&mut chunk).ok()?;
        body.extend_from_slice(&chunk);
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).ok()?;
    }
}

/// Files of a tar archive as (path, contents), in archive order
pub fn tar_files(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .entries()
        .expect("archive should be readable")
        .map(|entry| {
            let mut entry = entry.expect("archive entry should be valid");
            let path = entry
                .path()
                .expect("entry path")
                .to_string_lossy()
                .into_owned();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).expect("entry body");
            (path, body)
        })
        .collect()
}

/// Number of entries directly inside `dir`
pub fn dir_entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .expect("directory should be readable")
        .count()
}
