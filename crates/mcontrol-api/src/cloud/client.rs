// M-Control cloud HTTP client
//
// Wraps `reqwest::Client` with the aircontrolbase.com form-post
// conventions and `{ code, msg, result }` envelope handling. Endpoint
// methods live in `auth.rs` and `devices.rs` as inherent impls.

use reqwest::header::{ACCEPT, COOKIE};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Session;
use crate::cloud::models::{CloudEnvelope, SESSION_EXPIRED_CODE};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for the M-Control cloud.
///
/// Stateless with respect to authentication: every authenticated call
/// takes the [`Session`] to present. Session lifecycle (caching, re-login)
/// belongs to the caller.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CloudClient {
    /// Create a cloud client from a `TransportConfig`.
    ///
    /// `base_url` is the site root, normally
    /// [`DEFAULT_CLOUD_URL`](crate::cloud::DEFAULT_CLOUD_URL).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a cloud client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The cloud base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// POST an authenticated form and parse the response envelope.
    ///
    /// `userId` is added from the session and the session cookie is sent
    /// as the `Cookie` header. HTTP 401 and envelope code 40018 both map to
    /// [`Error::SessionExpired`]. The returned envelope may still carry a
    /// non-success code; interpreting it is up to the endpoint.
    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
        fields: &[(&str, &str)],
    ) -> Result<CloudEnvelope<T>, Error> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);

        let mut form: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 1);
        form.push(("userId", session.user_id()));
        form.extend_from_slice(fields);

        let resp = self
            .http
            .post(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(COOKIE, session.cookie_header())
            .form(&form)
            .send()
            .await
            .map_err(Error::Transport)?;

        let envelope: CloudEnvelope<T> = parse_envelope(resp).await?;
        if envelope.code == Some(SESSION_EXPIRED_CODE) {
            debug!(path, "cloud reported session expired");
            return Err(Error::SessionExpired);
        }
        Ok(envelope)
    }
}

/// Check the HTTP status and decode the JSON envelope.
pub(crate) async fn parse_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<CloudEnvelope<T>, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::SessionExpired);
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::CloudApi {
            code: Some(i64::from(status.as_u16())),
            message: format!("HTTP {status}: {}", preview(&body)),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;
    trace!(len = body.len(), "cloud response body");

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body,
    })
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
