//! Shared fail-over bookkeeping for the configured directory server URIs,
//! grounded on `nslcd_cfg->uris[]` and `uris_mutex` in the original
//! project's `nslcd/myldap.c`. The table itself only tracks per-URI
//! failure timestamps; the retry loop that walks it lives with the
//! directory session, which is the thing actually opening connections.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct UriState {
    pub uri: String,
    /// Set the first time this URI failed since its last success.
    pub first_failure: Option<Instant>,
    /// Set on every failure; cleared on success.
    pub last_failure: Option<Instant>,
}

impl UriState {
    fn new(uri: String) -> Self {
        UriState {
            uri,
            first_failure: None,
            last_failure: None,
        }
    }

    /// A URI is "hard failing" once it's been failing continuously for
    /// longer than `retrytime` and the most recent failure was itself
    /// recent enough that retrying now is unlikely to help.
    fn is_hard_failing(&self, now: Instant, retrytime: Duration) -> bool {
        match (self.first_failure, self.last_failure) {
            (Some(first), Some(last)) => last > first + retrytime && now < last + retrytime,
            _ => false,
        }
    }
}

/// The list of configured URIs plus their live fail-over state, shared
/// across all worker sessions behind a single mutex (matching the
/// original's single `uris_mutex` guarding the whole array rather than
/// one lock per URI).
pub struct UriTable {
    entries: Mutex<Vec<UriState>>,
}

impl UriTable {
    pub fn new(uris: Vec<String>) -> Self {
        UriTable {
            entries: Mutex::new(uris.into_iter().map(UriState::new).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uri_at(&self, index: usize) -> String {
        self.entries.lock().unwrap()[index].uri.clone()
    }

    /// Whether `index` should be skipped right now given `retrytime`.
    pub fn should_skip(&self, index: usize, retrytime: Duration) -> bool {
        self.entries.lock().unwrap()[index].is_hard_failing(Instant::now(), retrytime)
    }

    /// Record a successful connection, clearing any failure state.
    pub fn record_success(&self, index: usize) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = &mut entries[index];
        let was_failing = entry.last_failure.is_some();
        entry.first_failure = None;
        entry.last_failure = None;
        was_failing
    }

    /// Record a failed connection attempt. Per the original, an
    /// authentication-only search (one with a bind DN already set) does
    /// not count against a server's fail-over state, since a bad password
    /// is a client error, not a server outage.
    pub fn record_failure(&self, index: usize, is_authenticating: bool) {
        if is_authenticating {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let entry = &mut entries[index];
        if entry.first_failure.is_none() {
            entry.first_failure = Some(now);
        }
        entry.last_failure = Some(now);
    }

    /// Whether retrying `index` again before `retrytime` has elapsed since
    /// its first failure is still worth attempting.
    pub fn still_within_retry_window(&self, index: usize, retrytime: Duration) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries[index].first_failure {
            Some(first) => Instant::now() <= first + retrytime,
            None => true,
        }
    }

    /// Force every URI that is hard-failing but hasn't been retried in
    /// `retrytime` to become eligible again immediately. Used by the
    /// invalidator so a long-idle daemon doesn't wait out a full
    /// `reconnect_sleeptime` before noticing a server came back.
    pub fn force_retry_eligible(&self, retrytime: Duration) {
        let mut entries = self.entries.lock().unwrap();
        let cutoff = Instant::now() - retrytime;
        for entry in entries.iter_mut() {
            if let (Some(first), Some(last)) = (entry.first_failure, entry.last_failure) {
                if last > cutoff && last > first + retrytime {
                    entry.last_failure = Some(cutoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_uri_is_never_skipped() {
        let table = UriTable::new(vec!["ldap://a".into(), "ldap://b".into()]);
        assert!(!table.should_skip(0, Duration::from_secs(10)));
        assert!(!table.should_skip(1, Duration::from_secs(10)));
    }

    #[test]
    fn success_clears_prior_failure_state() {
        let table = UriTable::new(vec!["ldap://a".into()]);
        table.record_failure(0, false);
        assert!(table.record_success(0));
        assert!(!table.should_skip(0, Duration::from_millis(1)));
    }

    #[test]
    fn authenticating_failure_does_not_affect_failover_state() {
        let table = UriTable::new(vec!["ldap://a".into()]);
        table.record_failure(0, true);
        assert!(table.still_within_retry_window(0, Duration::from_secs(1)));
        assert!(!table.record_success(0));
    }

    #[test]
    fn hard_failure_is_skipped_until_retrytime_passes_since_last_failure() {
        let table = UriTable::new(vec!["ldap://a".into()]);
        let retry = Duration::from_millis(20);
        table.record_failure(0, false);
        sleep(Duration::from_millis(30));
        table.record_failure(0, false);
        assert!(table.should_skip(0, retry));
        sleep(Duration::from_millis(30));
        assert!(!table.should_skip(0, retry));
    }
}
