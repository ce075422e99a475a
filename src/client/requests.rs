/// Latest-only reads
///
/// Each read takes a ticket from a monotonically increasing counter. A result
/// is kept only if no newer read started in the meantime.
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ticket for one in-flight read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct LatestOnly {
    latest: AtomicU64,
}

impl LatestOnly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Run a read; `None` when a newer read superseded it
    pub async fn run<F, T>(&self, read: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let ticket = self.issue();
        let result = read.await;

        if self.is_current(ticket) {
            Some(result)
        } else {
            tracing::debug!(ticket = ticket.0, "Discarding superseded read");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_newer_ticket_supersedes() {
        let reads = LatestOnly::new();
        let first = reads.issue();
        assert!(reads.is_current(first));

        let second = reads.issue();
        assert!(!reads.is_current(first));
        assert!(reads.is_current(second));
    }

    #[tokio::test]
    async fn test_slow_stale_read_is_discarded() {
        let reads = Arc::new(LatestOnly::new());

        let slow = {
            let reads = reads.clone();
            tokio::spawn(async move {
                reads
                    .run(async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        "old filter"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let fast = reads.run(async { "new filter" }).await;
        assert_eq!(fast, Some("new filter"));
        assert_eq!(slow.await.unwrap(), None);
    }
}
