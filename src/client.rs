//! Outbound HTTP client, a thin wrapper over libcurl.
//!
//! The contract is callback-shaped: accumulate a body with
//! [`write`](ClientRequest::write), fire the exchange with
//! [`end`](ClientRequest::end), and the completion callback runs exactly
//! once with `Some(ClientResponse)` on success or `None` on failure.
//! Redirects are followed up to the configured cap; everything else
//! (connection pooling, TLS, proxies) is libcurl's business.

use crate::http::types::{HeaderMap, HttpVersion};
use curl::easy::{Easy, List};
use std::borrow::Cow;

/// Options accepted by [`ClientRequest::with_options`].
#[derive(Debug, Clone)]
pub enum ClientRequestOption {
    Method(String),
    Schema(String),
    Hostname(String),
    Port(u16),
    Path(String),
    Headers(Vec<(String, String)>),
    Username(String),
    Password(String),
    MaxRedirects(u32),
    DisableSslVerification,
}

/// Completed response for an outbound request.
#[derive(Debug)]
pub struct ClientResponse {
    status_code: u16,
    http_version: HttpVersion,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ClientResponse {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn http_version(&self) -> HttpVersion {
        self.http_version
    }

    /// Headers of the final hop when redirects were followed.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

type Callback = Box<dyn FnOnce(Option<ClientResponse>) + Send>;

/// Outbound request under construction.
pub struct ClientRequest {
    url: String,
    method: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    username: Option<String>,
    password: Option<String>,
    max_redirects: u32,
    disable_ssl_verification: bool,
    close_connection: bool,
    callback: Option<Callback>,
}

impl ClientRequest {
    /// A GET request for `url`; reshape it with the setters before `end`.
    pub fn new(
        url: &str,
        callback: impl FnOnce(Option<ClientResponse>) + Send + 'static,
    ) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            username: None,
            password: None,
            max_redirects: 10,
            disable_ssl_verification: false,
            close_connection: false,
            callback: Some(Box::new(callback)),
        }
    }

    /// Builds a request from an option list; unspecified parts default to
    /// `GET http://localhost:80/`.
    pub fn with_options(
        options: Vec<ClientRequestOption>,
        callback: impl FnOnce(Option<ClientResponse>) + Send + 'static,
    ) -> Self {
        let mut schema = "http".to_string();
        let mut hostname = "localhost".to_string();
        let mut port = 80;
        let mut path = "/".to_string();
        let mut request = Self::new("", callback);

        for option in options {
            match option {
                ClientRequestOption::Method(m) => request.method = m.to_ascii_uppercase(),
                ClientRequestOption::Schema(s) => {
                    schema = s.trim_end_matches("://").to_string();
                }
                ClientRequestOption::Hostname(h) => hostname = h,
                ClientRequestOption::Port(p) => port = p,
                ClientRequestOption::Path(p) => {
                    path = if p.starts_with('/') { p } else { format!("/{p}") };
                }
                ClientRequestOption::Headers(h) => request.headers.extend(h),
                ClientRequestOption::Username(u) => request.username = Some(u),
                ClientRequestOption::Password(p) => request.password = Some(p),
                ClientRequestOption::MaxRedirects(n) => request.max_redirects = n,
                ClientRequestOption::DisableSslVerification => {
                    request.disable_ssl_verification = true;
                }
            }
        }

        request.url = format!("{schema}://{hostname}:{port}{path}");
        request
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Asks the server to close the connection after this exchange.
    pub fn set_close(&mut self, close: bool) {
        self.close_connection = close;
    }

    /// Appends bytes to the request body.
    pub fn write(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Performs the exchange and invokes the completion callback. Calls
    /// after the first are no-ops.
    pub fn end(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };

        match self.perform() {
            Ok(response) => callback(Some(response)),
            Err(err) => {
                tracing::debug!(url = %self.url, error = %err, "client request failed");
                callback(None);
            }
        }
    }

    /// [`end`](Self::end), optionally asking the server to close the
    /// connection afterwards.
    pub fn end_with_close(&mut self, close: bool) {
        self.set_close(close);
        self.end();
    }

    fn perform(&mut self) -> Result<ClientResponse, curl::Error> {
        let mut easy = Easy::new();
        easy.url(&self.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(self.max_redirects)?;

        if self.disable_ssl_verification {
            easy.ssl_verify_peer(false)?;
            easy.ssl_verify_host(false)?;
        }
        if let Some(username) = &self.username {
            easy.username(username)?;
        }
        if let Some(password) = &self.password {
            easy.password(password)?;
        }

        if !self.body.is_empty() {
            easy.post_fields_copy(&self.body)?;
        }
        let implied = if self.body.is_empty() { "GET" } else { "POST" };
        if self.method != implied {
            easy.custom_request(&self.method)?;
        }

        let mut list = List::new();
        for (name, value) in &self.headers {
            list.append(&format!("{name}: {value}"))?;
        }
        if self.close_connection {
            list.append("Connection: close")?;
        }
        easy.http_headers(list)?;

        let mut body = Vec::new();
        let mut headers = HeaderMap::new();
        let mut http_version = HttpVersion::default();
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                let line = String::from_utf8_lossy(line);
                let line = line.trim_end();
                if let Some(rest) = line.strip_prefix("HTTP/") {
                    // A new status line starts the final hop's header block.
                    headers = HeaderMap::new();
                    http_version = parse_version(rest);
                } else if let Some((name, value)) = line.split_once(':') {
                    headers.append(name.trim(), value.trim());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let status_code = easy.response_code()? as u16;
        Ok(ClientResponse {
            status_code,
            http_version,
            headers,
            body,
        })
    }
}

fn parse_version(rest: &str) -> HttpVersion {
    let token = rest.split_whitespace().next().unwrap_or("1.1");
    let mut parts = token.splitn(2, '.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    HttpVersion { major, minor }
}
