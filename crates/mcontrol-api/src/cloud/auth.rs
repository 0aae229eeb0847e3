// Cloud login
//
// `/web/user/login` answers with the user id in the envelope and the
// session in `Set-Cookie`. Both are needed for every later call.

use reqwest::header::{ACCEPT, SET_COOKIE};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::auth::Session;
use crate::cloud::client::{CloudClient, parse_envelope};
use crate::cloud::models::{LOGIN_PATH, LoginResult};
use crate::error::Error;

impl CloudClient {
    /// Authenticate with account e-mail and password.
    ///
    /// HTTP 4xx responses and envelopes without a user id are credential
    /// rejections ([`Error::Authentication`]); transport failures surface
    /// as [`Error::Transport`] so callers can retry them.
    pub async fn login(&self, account: &str, password: &SecretString) -> Result<Session, Error> {
        let url = self.endpoint(LOGIN_PATH)?;
        debug!(account, "logging in at {}", url);

        let resp = self
            .http()
            .post(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .form(&[("account", account), ("password", password.expose_secret())])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {body}"),
            });
        }

        let cookie = session_cookie(resp.headers());
        let envelope = parse_envelope::<LoginResult>(resp).await?;

        let user_id = envelope
            .result
            .as_ref()
            .and_then(|r| r.id.clone())
            .filter(|id| !id.is_empty());

        let Some(user_id) = user_id else {
            return Err(Error::Authentication {
                message: if envelope.is_success() {
                    "login response missing user id".into()
                } else {
                    envelope.describe()
                },
            });
        };

        let Some(cookie) = cookie else {
            warn!("login succeeded but no session cookie was set");
            return Err(Error::CloudApi {
                code: envelope.code,
                message: "login response carried no session cookie".into(),
            });
        };

        debug!(user_id = %user_id, "login successful");
        Ok(Session::new(user_id, SecretString::from(cookie), account))
    }
}

/// Collapse all `Set-Cookie` headers into one `Cookie` header value.
fn session_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

    use super::session_cookie;

    #[test]
    fn joins_cookie_pairs_without_attributes() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("JSESSIONID=abc; Path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("lang=en"));
        assert_eq!(
            session_cookie(&headers).as_deref(),
            Some("JSESSIONID=abc; lang=en")
        );
    }

    #[test]
    fn no_cookie_headers() {
        assert!(session_cookie(&HeaderMap::new()).is_none());
    }
}
