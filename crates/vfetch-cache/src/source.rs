//! Remote range sources.
//!
//! [`RangeSource`] is the seam between the fetch engine and whatever serves
//! the remote object. [`HttpRangeSource`] is the production implementation:
//! `HEAD` for the size, authenticated `GET` with a `Range` header per block.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use url::Url;

use crate::error::{FetchError, Result};

/// Header carrying the configured auth token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Fallback cache-file base name when the URL has no usable path segment.
const DEFAULT_BASE_NAME: &str = "remote";

/// A remote object that can report its size and serve byte ranges.
pub trait RangeSource: Send + Sync {
    /// Total object size in bytes.
    fn probe_size(&self) -> Result<u64>;

    /// Fetch the inclusive byte range `[start, end]`.
    ///
    /// Returns the response body as received (block-compressed).
    fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Name used for the local cache-store file.
    fn base_name(&self) -> String {
        DEFAULT_BASE_NAME.to_string()
    }
}

impl<T: RangeSource + ?Sized> RangeSource for Arc<T> {
    fn probe_size(&self) -> Result<u64> {
        (**self).probe_size()
    }

    fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        (**self).fetch_range(start, end)
    }

    fn base_name(&self) -> String {
        (**self).base_name()
    }
}

/// Authenticated HTTP range source.
pub struct HttpRangeSource {
    client: Client,
    url: Url,
    token: String,
}

impl std::fmt::Debug for HttpRangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The token and any URL credentials stay out of logs.
        f.debug_struct("HttpRangeSource")
            .field("url", &redact_url_for_logs(&self.url).as_str())
            .finish()
    }
}

impl HttpRangeSource {
    /// Build a source for `url`. `timeout` of `None` waits forever.
    pub fn new(url: &str, token: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if !url.has_host() {
            return Err(FetchError::InvalidUrl(format!(
                "URL must be absolute: {}",
                redact_url_for_logs(&url)
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(format_reqwest_error(e)))?;

        Ok(Self {
            client,
            url,
            token: token.into(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL with credentials, query and fragment stripped.
    pub fn redacted_url(&self) -> Url {
        redact_url_for_logs(&self.url)
    }

    fn authorize(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.header(AUTH_TOKEN_HEADER, &self.token)
        }
    }
}

impl RangeSource for HttpRangeSource {
    fn probe_size(&self) -> Result<u64> {
        let resp = self
            .authorize(self.client.head(self.url.clone()))
            .send()
            .map_err(|e| FetchError::Http(format_reqwest_error(e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let raw = resp
            .headers()
            .get(CONTENT_LENGTH)
            .ok_or(FetchError::MissingContentLength)?;
        let raw = raw
            .to_str()
            .map_err(|_| FetchError::InvalidContentLength(format!("{raw:?}")))?;
        raw.trim()
            .parse::<u64>()
            .map_err(|_| FetchError::InvalidContentLength(raw.to_string()))
    }

    fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let resp = self
            .authorize(self.client.get(self.url.clone()))
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .map_err(|e| FetchError::Http(format_reqwest_error(e)))?;

        let status = resp.status().as_u16();
        if status >= 300 {
            let body = resp.text().unwrap_or_default();
            return Err(FetchError::HttpStatus { status, body });
        }

        let body = resp
            .bytes()
            .map_err(|e| FetchError::Http(format_reqwest_error(e)))?;
        Ok(body.to_vec())
    }

    fn base_name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string())
    }
}

fn redact_url_for_logs(url: &Url) -> Url {
    let mut url = url.clone();
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn format_reqwest_error(err: reqwest::Error) -> String {
    let mut msg = err.to_string();
    if let Some(url) = err.url() {
        let redacted = redact_url_for_logs(url);
        msg = msg.replace(url.as_str(), redacted.as_str());
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_is_last_segment() {
        let src = HttpRangeSource::new("http://host/images/abc/disk.qcow2", "", None).unwrap();
        assert_eq!(src.base_name(), "disk.qcow2");

        let src = HttpRangeSource::new("http://host/images/abc/", "", None).unwrap();
        assert_eq!(src.base_name(), "abc");
    }

    #[test]
    fn test_base_name_fallback() {
        let src = HttpRangeSource::new("http://host", "", None).unwrap();
        assert_eq!(src.base_name(), "remote");
    }

    #[test]
    fn test_rejects_relative_and_garbage_urls() {
        assert!(matches!(
            HttpRangeSource::new("/just/a/path", "", None),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpRangeSource::new("mailto:someone@example.com", "", None),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let src =
            HttpRangeSource::new("http://user:pw@host/obj?sig=abc", "hunter2", None).unwrap();
        let dbg = format!("{:?}", src);
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("pw"));
        assert!(!dbg.contains("sig=abc"));
        assert_eq!(src.redacted_url().as_str(), "http://host/obj");
    }
}
