use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

/// Raised by [`TimedQueue::put`] when the backpressure limit is hit.
#[derive(Debug, Clone, Copy)]
pub struct QueueFull {
    /// Queue size at the time of the rejected put.
    pub size: usize,
    /// Configured maximum.
    pub max: usize,
}

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full ({}/{})", self.size, self.max)
    }
}

impl std::error::Error for QueueFull {}

/// Heap entry ordered by `(due_at, seq)`, earliest first.
struct Entry<T> {
    due_at: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed so BinaryHeap's max-heap pops the earliest entry first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.due_at, other.seq).cmp(&(self.due_at, self.seq))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

/// Bounded min-heap of scheduled items, keyed by `(due_at, seq)`.
///
/// `seq` is assigned under the queue lock, so among items that share a
/// `due_at` the pop order is the enqueue order. Producers never block:
/// a put that would exceed the bound fails with [`QueueFull`] instead.
pub struct TimedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    max_size: usize,
    poll_interval: Duration,
}

impl<T> TimedQueue<T> {
    #[must_use]
    pub fn new(max_size: usize, poll_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
            max_size,
            poll_interval,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().expect("timed queue lock poisoned")
    }

    /// Schedule an item for `due_at`, waking the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] without enqueueing when the queue already
    /// holds `max_size` items.
    pub fn put(&self, due_at: Instant, item: T) -> Result<(), QueueFull> {
        {
            let mut inner = self.lock();
            let size = inner.heap.len();
            if size >= self.max_size {
                return Err(QueueFull {
                    size,
                    max: self.max_size,
                });
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Entry { due_at, seq, item });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Block until the head entry is due and pop it, or until `stop` is
    /// observed set, returning `None`.
    ///
    /// The wait is capped at the poll interval even when the head is due
    /// far in the future (or the queue is empty), so a stop request is
    /// observed within one interval regardless of the schedule.
    pub async fn pop_due(&self, stop: &AtomicBool) -> Option<T> {
        loop {
            if stop.load(Ordering::Acquire) {
                return None;
            }

            // Register for wakeups before inspecting the heap so a put
            // landing between the check and the wait is not missed.
            let notified = self.notify.notified();

            let wait = {
                let mut inner = self.lock();
                let now = Instant::now();
                match inner.heap.peek() {
                    Some(head) if head.due_at <= now => {
                        let entry = inner.heap.pop()?;
                        return Some(entry.item);
                    }
                    Some(head) => head.due_at.saturating_duration_since(now),
                    None => self.poll_interval,
                }
            };

            let wait = wait.min(self.poll_interval);
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Wake the consumer immediately (used when setting the stop flag).
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Current number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all queued items, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.heap.len();
        inner.heap.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    const POLL: Duration = Duration::from_millis(20);

    fn queue(max: usize) -> TimedQueue<u32> {
        TimedQueue::new(max, POLL)
    }

    #[tokio::test]
    async fn pops_in_due_then_seq_order() {
        let q = queue(16);
        let now = Instant::now();
        let stop = AtomicBool::new(false);

        q.put(now + Duration::from_millis(30), 3).unwrap();
        q.put(now, 1).unwrap();
        q.put(now + Duration::from_millis(30), 4).unwrap();
        q.put(now, 2).unwrap();

        assert_eq!(q.pop_due(&stop).await, Some(1));
        assert_eq!(q.pop_due(&stop).await, Some(2));
        assert_eq!(q.pop_due(&stop).await, Some(3));
        assert_eq!(q.pop_due(&stop).await, Some(4));
    }

    #[tokio::test]
    async fn overflow_fails_without_enqueueing() {
        let q = queue(4);
        let now = Instant::now();
        for i in 0..4 {
            q.put(now, i).unwrap();
        }

        let err = q.put(now, 99).unwrap_err();
        assert_eq!(err.size, 4);
        assert_eq!(err.max, 4);
        assert_eq!(q.len(), 4);

        let stop = AtomicBool::new(false);
        for expected in 0..4 {
            assert_eq!(q.pop_due(&stop).await, Some(expected));
        }
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn future_item_is_not_popped_early() {
        let q = queue(4);
        let stop = AtomicBool::new(false);
        let start = Instant::now();
        q.put(start + Duration::from_millis(60), 7).unwrap();

        let item = q.pop_due(&stop).await;
        assert_eq!(item, Some(7));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn put_wakes_a_blocked_consumer() {
        let q = Arc::new(queue(4));
        let stop = Arc::new(AtomicBool::new(false));

        let consumer = {
            let q = Arc::clone(&q);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move { q.pop_due(&stop).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.put(Instant::now(), 42).unwrap();

        let item = tokio::time::timeout(Duration::from_millis(500), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, Some(42));
    }

    #[tokio::test]
    async fn stop_is_observed_within_one_poll_interval() {
        let q = Arc::new(queue(4));
        let stop = Arc::new(AtomicBool::new(false));
        // Head scheduled far in the future must not delay shutdown.
        q.put(Instant::now() + Duration::from_secs(3600), 1).unwrap();

        let consumer = {
            let q = Arc::clone(&q);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move { q.pop_due(&stop).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.store(true, Ordering::Release);
        q.wake();

        let item = tokio::time::timeout(Duration::from_millis(500), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, None);
    }

    #[tokio::test]
    async fn clear_discards_everything() {
        let q = queue(8);
        let now = Instant::now();
        for i in 0..5 {
            q.put(now, i).unwrap();
        }
        assert_eq!(q.clear(), 5);
        assert!(q.is_empty());
    }

    #[test]
    fn queue_full_display() {
        let err = QueueFull { size: 4, max: 4 };
        assert_eq!(err.to_string(), "queue is full (4/4)");
    }
}
