use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};

/// How long the cloud is assumed to honour a session cookie.
///
/// The vendor publishes no lifetime; expiry is detected reactively through
/// `SessionExpired`. The estimate is informational only.
const SESSION_LIFETIME_HOURS: i64 = 12;

/// An authenticated cloud session.
///
/// Produced by [`CloudClient::login`](crate::CloudClient::login) and passed
/// explicitly into every authenticated call. Never mutated: a re-login
/// yields a fresh `Session`.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: String,
    token: SecretString,
    account: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session from the login response pieces.
    ///
    /// `token` is the raw `Cookie` header value (e.g. `"JSESSIONID=abc"`).
    pub fn new(user_id: impl Into<String>, token: SecretString, account: impl Into<String>) -> Self {
        let issued_at = Utc::now();
        Self {
            user_id: user_id.into(),
            token,
            account: account.into(),
            issued_at,
            expires_at: issued_at + TimeDelta::hours(SESSION_LIFETIME_HOURS),
        }
    }

    /// Cloud user id, sent as the `userId` form field.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Account e-mail the session was opened for.
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Estimated expiry. The cloud may revoke earlier.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_likely_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The `Cookie` header value carrying the session.
    pub(crate) fn cookie_header(&self) -> &str {
        self.token.expose_secret()
    }
}
