// ── Cloud session lifecycle ──
//
// Owns the one `Session` for the account. Login is single-flight: callers
// that find no session queue on an async mutex and re-check once they get
// it, so N concurrent callers trigger exactly one login.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use mcontrol_api::{CloudClient, Session};

use crate::error::{AuthError, CoreError};

/// Consecutive credential rejections after which login fails fast.
const REJECTION_LATCH: u32 = 2;

#[derive(Debug, Clone)]
struct Credentials {
    email: String,
    password: SecretString,
}

/// Retry policy for transient cloud failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `backoff * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Session manager for one M-Control account.
pub struct SessionManager {
    client: CloudClient,
    credentials: RwLock<Credentials>,
    current: Mutex<Option<Arc<Session>>>,
    login_lock: tokio::sync::Mutex<()>,
    rejections: AtomicU32,
    retry: RetryPolicy,
}

impl SessionManager {
    pub fn new(
        client: CloudClient,
        email: impl Into<String>,
        password: SecretString,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            credentials: RwLock::new(Credentials {
                email: email.into(),
                password,
            }),
            current: Mutex::new(None),
            login_lock: tokio::sync::Mutex::new(()),
            rejections: AtomicU32::new(0),
            retry,
        }
    }

    /// The underlying cloud client.
    pub fn client(&self) -> &CloudClient {
        &self.client
    }

    /// The cached session, if any.
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.lock().expect("session lock poisoned").clone()
    }

    /// `true` once credentials were rejected often enough that login
    /// attempts are no longer made.
    pub fn is_latched(&self) -> bool {
        self.rejections.load(Ordering::Acquire) >= REJECTION_LATCH
    }

    /// Return the cached session, logging in if there is none.
    ///
    /// Concurrent callers share one in-flight login.
    pub async fn ensure_session(&self) -> Result<Arc<Session>, CoreError> {
        if let Some(session) = self.current() {
            return Ok(session);
        }
        self.check_latch()?;

        let _guard = self.login_lock.lock().await;
        // Another caller may have logged in while we waited.
        if let Some(session) = self.current() {
            return Ok(session);
        }
        self.check_latch()?;
        self.login_locked().await
    }

    /// Force a fresh login, replacing any cached session.
    pub async fn login(&self) -> Result<Arc<Session>, CoreError> {
        self.check_latch()?;
        let _guard = self.login_lock.lock().await;
        self.login_locked().await
    }

    /// Drop `stale` if it is still the cached session.
    ///
    /// A session that was already replaced by a concurrent re-login is
    /// left alone.
    pub fn invalidate(&self, stale: &Arc<Session>) {
        let mut current = self.current.lock().expect("session lock poisoned");
        if current.as_ref().is_some_and(|s| Arc::ptr_eq(s, stale)) {
            debug!("invalidating cloud session");
            *current = None;
        }
    }

    /// Replace the credentials and clear the rejection latch.
    pub fn update_credentials(&self, email: impl Into<String>, password: SecretString) {
        *self.credentials.write().expect("credentials lock poisoned") = Credentials {
            email: email.into(),
            password,
        };
        *self.current.lock().expect("session lock poisoned") = None;
        self.rejections.store(0, Ordering::Release);
        info!("cloud credentials updated");
    }

    /// Run a cloud operation with the current session.
    ///
    /// On `SessionExpired` the session is invalidated, re-established once
    /// and the operation retried once; a second expiry is surfaced.
    /// Network failures (including those during login) are retried with
    /// exponential backoff. Error answers from the cloud, 5xx included,
    /// and credential rejections are never retried.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, CoreError>
    where
        F: Fn(CloudClient, Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T, mcontrol_api::Error>>,
    {
        let mut attempt = 0;
        let mut relogged = false;

        loop {
            let (err, network) = match self.ensure_session().await {
                Ok(session) => match op(self.client.clone(), Arc::clone(&session)).await {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_auth_expired() => {
                        if relogged {
                            warn!("session expired again right after re-login");
                            return Err(CoreError::SessionExpired);
                        }
                        debug!("session expired, re-authenticating");
                        relogged = true;
                        self.invalidate(&session);
                        continue;
                    }
                    Err(e) => {
                        let network = e.is_transient();
                        (CoreError::from(e), network)
                    }
                },
                Err(e) => {
                    let network = matches!(e, CoreError::Auth(AuthError::Network { .. }));
                    (e, network)
                }
            };

            if network && attempt < self.retry.retries {
                let delay = self.retry.delay(attempt);
                attempt += 1;
                debug!(error = %err, attempt, ?delay, "transient cloud failure, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
            return Err(err);
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn check_latch(&self) -> Result<(), CoreError> {
        if self.is_latched() {
            return Err(AuthError::InvalidCredentials {
                message: "credentials were rejected; update them to retry".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Perform the network login. Caller holds `login_lock`.
    async fn login_locked(&self) -> Result<Arc<Session>, CoreError> {
        let Credentials { email, password } = self
            .credentials
            .read()
            .expect("credentials lock poisoned")
            .clone();

        debug!(account = %email, "logging in to cloud");
        match self.client.login(&email, &password).await {
            Ok(session) => {
                let session = Arc::new(session);
                *self.current.lock().expect("session lock poisoned") = Some(Arc::clone(&session));
                self.rejections.store(0, Ordering::Release);
                info!(user_id = session.user_id(), "cloud session established");
                Ok(session)
            }
            Err(e) if e.is_credential_rejection() => {
                let count = self.rejections.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(rejections = count, error = %e, "cloud rejected credentials");
                Err(AuthError::InvalidCredentials {
                    message: e.to_string(),
                }
                .into())
            }
            Err(e) if e.is_transient() => {
                Err(AuthError::Network {
                    message: e.to_string(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
