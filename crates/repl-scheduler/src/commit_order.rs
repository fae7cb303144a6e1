use tokio::sync::{Mutex, Notify};

/// Forces commit order to match primary order even when Workers finish
/// applying their groups out of order. Only consulted when
/// `order_commits` is configured; dependency-mode groups otherwise commit
/// as soon as their own Worker finishes.
pub struct CommitOrderManager {
    next: Mutex<u64>,
    notify: Notify,
}

impl CommitOrderManager {
    pub fn new(starting_at: u64) -> Self {
        Self {
            next: Mutex::new(starting_at),
            notify: Notify::new(),
        }
    }

    /// Block until every group before `group_id` has called `advance`.
    pub async fn wait_turn(&self, group_id: u64) {
        loop {
            {
                let next = self.next.lock().await;
                if *next == group_id {
                    return;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Commit this group's turn and let the next one in line proceed.
    pub async fn advance(&self) {
        let mut next = self.next.lock().await;
        *next += 1;
        drop(next);
        self.notify.notify_waiters();
    }
}
