//! Directory connection lifecycle and the URI fail-over loop, grounded on
//! `do_open`/`do_bind`/`do_retry_search` in the original project's
//! `nslcd/myldap.c`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ldap3::{LdapConnAsync, LdapConnSettings};
use log::{debug, info, warn};

use nslcd_config::Config;

use crate::error::{is_unrecoverable, DirectoryError};
use crate::invalidator::Invalidator;
use crate::ppolicy::{self, PasswordPolicyResponse};

/// One directory connection plus the fail-over state needed to reconnect
/// across configured URIs. Each worker owns exactly one session for its
/// whole lifetime (component I hands a session to a worker once and the
/// worker keeps reusing it request after request).
pub struct DirectorySession {
    config: Arc<Config>,
    invalidator: Invalidator,
    current_uri: usize,
    ldap: Option<ldap3::Ldap>,
    last_active: Instant,
}

impl DirectorySession {
    pub fn new(config: Arc<Config>, invalidator: Invalidator) -> Result<Self, DirectoryError> {
        if config.uris.is_empty() {
            return Err(DirectoryError::NoUris);
        }
        Ok(DirectorySession {
            config,
            invalidator,
            current_uri: 0,
            ldap: None,
            last_active: Instant::now(),
        })
    }

    /// Record that the session was just used for a request, resetting its
    /// idle clock.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Drop the open connection unconditionally, forcing the next
    /// operation to reconnect (and thus re-evaluate the fail-over table),
    /// matching `SIGUSR1`'s `immediate_reconnect` semantics.
    pub fn force_reconnect(&mut self) {
        self.close();
    }

    /// Drop the open connection if it has sat unused past
    /// `idle_timelimit`, matching the worker loop's per-accept-timeout
    /// idle check (component I step 3). A cheap no-op when there's
    /// nothing open or no limit configured.
    pub fn close_if_idle(&mut self) {
        if let (Some(limit), true) = (self.config.idle_timelimit, self.ldap.is_some()) {
            if self.last_active.elapsed() > limit {
                debug!("closing idle directory connection to {}", self.config.uris.uri_at(self.current_uri));
                self.close();
            }
        }
    }

    fn advance_uri(&mut self) {
        self.current_uri = (self.current_uri + 1) % self.config.uris.len();
    }

    fn close(&mut self) {
        self.ldap = None;
    }

    /// Open a fresh connection to the currently-selected URI and bind
    /// with the configured service credentials (or anonymously, if none
    /// are configured).
    async fn connect_current(&mut self) -> Result<(), DirectoryError> {
        let uri = self.config.uris.uri_at(self.current_uri);
        debug!("connecting to {uri}");
        let settings = LdapConnSettings::new().set_starttls(matches!(
            self.config.ssl,
            nslcd_config::Ssl::StartTls
        ));
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &uri).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("directory connection driver exited: {e}");
            }
        });
        match (&self.config.binddn, &self.config.bindpw) {
            (Some(dn), Some(pw)) => ldap.simple_bind(dn, pw).await?.success()?,
            (Some(dn), None) => ldap.simple_bind(dn, "").await?.success()?,
            _ => ldap.simple_bind("", "").await?.success()?,
        };
        self.ldap = Some(ldap);
        Ok(())
    }

    /// Bind as an arbitrary DN/password pair, used for PAM authentication
    /// (`Opcode::Authenticate`) rather than the service identity. Bind
    /// failures here are reported directly and never count against a
    /// server's fail-over state, matching the original's
    /// `session->binddn[0] != '\0'` special case.
    pub async fn bind_as(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.bind_as_with_ppolicy(dn, password, false).await.0
    }

    /// As [`Self::bind_as`], additionally attaching the password policy
    /// request control when `request_ppolicy` is set, and decoding
    /// whatever response control the server sends back regardless of
    /// whether the bind itself succeeded -- a server reporting
    /// `LDAP_INVALID_CREDENTIALS` for a locked or expired account still
    /// attaches the response control explaining why.
    pub async fn bind_as_with_ppolicy(
        &mut self,
        dn: &str,
        password: &str,
        request_ppolicy: bool,
    ) -> (Result<(), DirectoryError>, Option<PasswordPolicyResponse>) {
        let mut response = None;
        let outcome = {
            let response = &mut response;
            self.retry(true, move |ldap| {
                let dn = dn.to_string();
                let password = password.to_string();
                let response = &mut *response;
                Box::pin(async move {
                    if request_ppolicy {
                        ldap.with_controls(vec![ppolicy::request_control()]);
                    }
                    let result = ldap.simple_bind(&dn, &password).await?;
                    if request_ppolicy {
                        *response = ppolicy::response_from(&result);
                    }
                    result.success()
                })
            })
            .await
        };
        (outcome, response)
    }

    /// Run `op` against an open, bound connection, retrying across every
    /// configured URI per the fail-over state machine: servers already
    /// known to be hard-failing are skipped, a failure advances to the
    /// next URI and records the failure, and the whole attempt gives up
    /// once `reconnect_retrytime` has elapsed without a success.
    pub async fn retry<T, F>(&mut self, is_authenticating: bool, mut op: F) -> Result<T, DirectoryError>
    where
        F: FnMut(&mut ldap3::Ldap) -> std::pin::Pin<Box<dyn Future<Output = Result<T, ldap3::LdapError>> + Send>>,
    {
        let deadline = Instant::now() + self.config.reconnect_retrytime;
        let uri_count = self.config.uris.len();
        loop {
            for _ in 0..uri_count {
                let idx = self.current_uri;
                if self.config.uris.should_skip(idx, self.config.reconnect_retrytime) {
                    self.advance_uri();
                    continue;
                }
                if self.ldap.is_none() {
                    if let Err(e) = self.connect_current().await {
                        self.config.uris.record_failure(idx, is_authenticating);
                        self.advance_uri();
                        warn!("failed to connect to {}: {e}", self.config.uris.uri_at(idx));
                        continue;
                    }
                }
                let ldap = self.ldap.as_mut().expect("just connected or already open");
                match op(ldap).await {
                    Ok(value) => {
                        if self.config.uris.record_success(idx) {
                            info!("connected to directory server {}", self.config.uris.uri_at(idx));
                            for db in &self.config.reconnect_invalidate {
                                self.invalidator.notify(*db);
                            }
                        }
                        self.last_active = Instant::now();
                        return Ok(value);
                    }
                    Err(e) => {
                        self.close();
                        if is_authenticating
                            && matches!(
                                &e,
                                ldap3::LdapError::LdapResult { result }
                                    if result.rc == crate::error::RC_INVALID_CREDENTIALS
                            )
                        {
                            return Err(DirectoryError::InvalidCredentials);
                        }
                        if is_unrecoverable(&e) {
                            warn!("unrecoverable error on {}: {e}", self.config.uris.uri_at(idx));
                        }
                        self.config.uris.record_failure(idx, is_authenticating);
                        self.advance_uri();
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(DirectoryError::AllUrisFailed);
            }
            tokio::time::sleep(self.config.reconnect_sleeptime).await;
        }
    }

    /// Apply `mods` to `dn`, used by the PAM password-change and
    /// user-modify operations. Runs through the same fail-over retry loop
    /// as a search, since a modify can just as validly land on a
    /// since-failed-over server.
    pub async fn modify(
        &mut self,
        dn: &str,
        mods: Vec<ldap3::Mod<String>>,
    ) -> Result<(), DirectoryError> {
        self.retry(false, move |ldap| {
            let dn = dn.to_string();
            let mods = mods.clone();
            Box::pin(async move { ldap.modify(&dn, mods).await?.success() })
        })
        .await?;
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.config.idle_timelimit
    }
}
