//! Cache invalidation signalling, grounded on `invalidator_do()` in the
//! original's `nslcd/invalidator.c`: when a session reconnects after a
//! server outage, or when the admin control channel asks for it, every
//! database configured in `reconnect_invalidate` should have its
//! NSS-side cache (nscd, sssd, ...) dropped since it may now be stale.
//!
//! The original shells out to an external invalidator command per
//! database; this rendition instead broadcasts the event to whichever
//! subscriber (the admin control channel, a future nscd-notifying task)
//! wants to act on it, which is a better fit for an async daemon than
//! spawning a process per invalidation.

use log::debug;
use tokio::sync::broadcast;

use nslcd_attrs::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    All,
    Database(Database),
}

#[derive(Clone)]
pub struct Invalidator {
    sender: broadcast::Sender<Invalidation>,
}

impl Invalidator {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Invalidator { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.sender.subscribe()
    }

    pub fn notify_all(&self) {
        debug!("signalling cache invalidation for all databases");
        let _ = self.sender.send(Invalidation::All);
    }

    pub fn notify(&self, database: Database) {
        debug!("signalling cache invalidation for {}", database.name());
        let _ = self.sender.send(Invalidation::Database(database));
    }
}

impl Default for Invalidator {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_broadcast_invalidations() {
        let invalidator = Invalidator::new(8);
        let mut rx1 = invalidator.subscribe();
        let mut rx2 = invalidator.subscribe();
        invalidator.notify(Database::Passwd);
        assert_eq!(rx1.recv().await.unwrap(), Invalidation::Database(Database::Passwd));
        assert_eq!(rx2.recv().await.unwrap(), Invalidation::Database(Database::Passwd));
    }

    #[tokio::test]
    async fn notify_all_is_distinguishable_from_a_single_database() {
        let invalidator = Invalidator::new(8);
        let mut rx = invalidator.subscribe();
        invalidator.notify_all();
        assert_eq!(rx.recv().await.unwrap(), Invalidation::All);
    }
}
