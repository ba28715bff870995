//! Minimal HTTP helpers for talking to the daemon.
//!
//! Every call is sent exactly once. A network failure, an unexpected status
//! or an undecodable body is returned to the caller as-is, with the request
//! URL attached.

use crate::error::{Error, Result};
use reqwest::{IntoUrl, StatusCode, Url};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Empty query string for [`Transport::get`]
pub const NO_QUERY: &[(&str, &str)] = &[];

/// HTTP transport bound to a daemon base URL
#[derive(Debug, Clone)]
pub struct Transport {
    http: HttpClient,
    base: String,
}

impl Transport {
    /// Create a transport for `base` (e.g. `http://host:2375/v1.41`) with a fixed request timeout
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut base = base.into();
        if !base.starts_with("http://") && !base.starts_with("https://") {
            base = format!("http://{}", base);
        }
        let base = base.trim_end_matches('/').to_string();

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Transport {
                url: base.clone(),
                source,
            })?;

        Ok(Self { http, base })
    }

    /// Base URL all paths are resolved against
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Full URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// URL for a path built from `segments`, each percent-encoded as a single segment
    pub fn segments_url(&self, segments: &[&str]) -> Result<Url> {
        let invalid = |reason: String| Error::InvalidUrl {
            url: self.base.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issue a GET and decode the JSON body.
    ///
    /// `query` is serialized into the query string; pass [`NO_QUERY`] for none.
    /// Any status other than 200 is a [`Error::Request`].
    pub fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.get_url(self.url(path), query)
    }

    /// Like [`Transport::get`], with the path given as raw segments.
    ///
    /// Segments may hold any characters, including `/`, `?` and `#`.
    pub fn get_segments<T, Q>(&self, segments: &[&str], query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.segments_url(segments)?;
        self.get_url(url, query)
    }

    fn get_url<T, Q, U>(&self, url: U, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
        U: IntoUrl,
    {
        let request = self.http.get(url).query(query);
        let (url, response) = self.send(request, "GET", StatusCode::OK)?;
        decode(&url, response)
    }

    /// Issue a POST with a JSON body and decode the JSON response.
    ///
    /// Daemon endpoints signal success with different codes, so the caller
    /// names the status it expects.
    pub fn post<T, B>(&self, path: &str, body: &B, expected: StatusCode) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self
            .http
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        let (url, response) = self.send(request, "POST", expected)?;
        decode(&url, response)
    }

    /// Start a POST request against an API path for callers that need a raw body
    pub(crate) fn post_request(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path))
    }

    /// Send a prepared request and check its status.
    ///
    /// Returns the final URL (with query string) alongside the unread response.
    pub(crate) fn send(
        &self,
        request: RequestBuilder,
        method: &'static str,
        expected: StatusCode,
    ) -> Result<(String, Response)> {
        let request = request.build().map_err(|source| Error::Transport {
            url: self.base.clone(),
            source,
        })?;
        let url = request.url().to_string();
        debug!("{} {}", method, url);

        let response = self
            .http
            .execute(request)
            .map_err(|source| Error::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != expected {
            let message = error_message(response);
            return Err(Error::Request {
                method,
                url,
                status: status.as_u16(),
                message,
            });
        }

        Ok((url, response))
    }
}

fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let body = response.bytes().map_err(|source| Error::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| Error::Decode {
        url: url.to_string(),
        source,
    })
}

/// Best-effort diagnostic text for a failed response.
///
/// The daemon usually answers errors with `{"message": "..."}`; anything else
/// is passed through as raw text.
fn error_message(response: Response) -> String {
    #[derive(serde::Deserialize)]
    struct DaemonMessage {
        message: String,
    }

    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string();
    let text = match response.text() {
        Ok(text) => text,
        Err(_) => return reason,
    };

    match serde_json::from_str::<DaemonMessage>(&text) {
        Ok(m) => m.message,
        Err(_) if text.trim().is_empty() => reason,
        Err(_) => text.trim().to_string(),
    }
}
