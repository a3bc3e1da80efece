//! HTTP client for transfers
//!
//! Redirects are never followed by reqwest itself. A download follows at most
//! one hop, for 301/302/307/308 only, on a second client configured with the
//! shorter redirect timeouts. Credential headers are only carried over when
//! the target shares the original origin. Uploads do not redirect.

use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue,
    LOCATION, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use reqwest::redirect::Policy;
use reqwest::{Body, Client, Method, Response, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use super::error::{Result, TransferError};
use crate::config::HttpConfig;
use crate::jobs::HeadersMap;

/// Connect and per-read timeouts for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Timeouts {
    pub fn from_millis(connect_ms: u64, read_ms: u64) -> Self {
        Self {
            connect: Duration::from_millis(connect_ms),
            read: Duration::from_millis(read_ms),
        }
    }
}

/// HTTP connection for a single job
pub struct HttpTransferClient {
    client: Client,
    redirect_client: Client,
}

impl HttpTransferClient {
    pub fn new(http: &HttpConfig, timeouts: Timeouts) -> Result<Self> {
        let (connect, read) = http.redirect_timeouts();
        Ok(Self {
            client: build_client(&http.user_agent, timeouts)?,
            redirect_client: build_client(&http.user_agent, Timeouts { connect, read })?,
        })
    }

    /// GET `url`, following one redirect hop when the status allows it
    pub async fn get(&self, url: &str, headers: &HeadersMap) -> Result<Response> {
        let url = parse_url(url)?;
        debug!(%url, "Opening connection");

        let response = self
            .client
            .get(url)
            .headers(header_map(headers)?)
            .send()
            .await?;

        if is_followable_redirect(response.status()) {
            return self.follow_redirect(response, headers).await;
        }
        Ok(response)
    }

    /// Re-issue the request to the `Location` target; the result is final
    async fn follow_redirect(&self, response: Response, headers: &HeadersMap) -> Result<Response> {
        let Some(location) = response.headers().get(LOCATION) else {
            debug!(
                url = %response.url(),
                status = response.status().as_u16(),
                "Redirect without Location, not following"
            );
            return Ok(response);
        };

        let location = location.to_str().map_err(|_| {
            TransferError::Connection("redirect Location header is not valid text".to_string())
        })?;
        let target = response.url().join(location).map_err(|err| {
            TransferError::Connection(format!("invalid redirect target '{location}': {err}"))
        })?;

        let mut outgoing = header_map(headers)?;
        let cross_origin = target.origin() != response.url().origin();
        if cross_origin {
            strip_credentials(&mut outgoing);
        }

        debug!(
            from = %response.url(),
            to = %target,
            status = response.status().as_u16(),
            cross_origin,
            "Following redirect"
        );
        drop(response);

        let redirected = self
            .redirect_client
            .get(target)
            .headers(outgoing)
            .send()
            .await?;
        Ok(redirected)
    }

    /// Send a streamed request body
    ///
    /// `content_type` goes in before the caller headers so they can override
    /// it. Without `content_length` the body is sent chunked.
    pub async fn send_body(
        &self,
        method: Method,
        url: &str,
        headers: &HeadersMap,
        content_type: Option<&str>,
        content_length: Option<u64>,
        body: Body,
    ) -> Result<Response> {
        let url = parse_url(url)?;
        debug!(%url, %method, ?content_length, "Sending request body");

        let mut request = self.client.request(method, url);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        request = request.headers(header_map(headers)?);
        if let Some(length) = content_length {
            request = request.header(CONTENT_LENGTH, length);
        }

        Ok(request.body(body).send().await?)
    }
}

fn build_client(user_agent: &str, timeouts: Timeouts) -> Result<Client> {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .user_agent(user_agent)
        .redirect(Policy::none())
        .build()
        .map_err(|err| TransferError::Connection(format!("failed to build HTTP client: {err}")))
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| TransferError::MalformedRequest(format!("invalid URL '{url}': {err}")))
}

/// Only these four codes trigger the redirect hop
pub fn is_followable_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 307 | 308)
}

/// Caller headers as a reqwest header map, verbatim
pub fn header_map(headers: &HeadersMap) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransferError::MalformedRequest(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            TransferError::MalformedRequest(format!("invalid value for header '{name}'"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Headers that must not follow a redirect to another origin
const CREDENTIAL_HEADERS: [HeaderName; 4] =
    [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, WWW_AUTHENTICATE];

fn strip_credentials(headers: &mut HeaderMap) {
    for name in &CREDENTIAL_HEADERS {
        headers.remove(name);
    }
}

/// Single-valued view of response headers; the first value of a name wins
pub fn flatten_headers(headers: &HeaderMap) -> HeadersMap {
    let mut flat = HeadersMap::new();
    for (name, value) in headers {
        flat.entry(name.as_str().to_string())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    flat
}
