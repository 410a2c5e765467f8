//! Bounded single-producer/single-consumer hand-off between the transport pump
//! and the orchestrator.
//!
//! When full, the producer waits up to `block_timeout` for room. If the
//! consumer still has not caught up, the configured overflow policy decides
//! which message is lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::{self, Duration};

use super::ChatMessage;
use crate::utils::time::deadline_after;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room
    DropOldest,
    /// Discard the message being pushed
    DropNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropOldest
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub block_timeout: Duration,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            overflow: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    DroppedOldest,
    DroppedNewest,
    Closed,
}

#[derive(Debug, PartialEq)]
pub enum Pop {
    Message(ChatMessage),
    Empty,
    Closed,
}

struct Shared {
    buffer: Mutex<VecDeque<ChatMessage>>,
    capacity: usize,
    closed: AtomicBool,
    item_ready: Notify,
    space_ready: Notify,
    dropped: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<ChatMessage>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.item_ready.notify_one();
        self.space_ready.notify_one();
    }
}

pub fn chat_queue(config: &QueueConfig) -> (QueueSender, QueueReceiver) {
    let capacity = config.capacity.max(1);
    let shared = Arc::new(Shared {
        buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        closed: AtomicBool::new(false),
        item_ready: Notify::new(),
        space_ready: Notify::new(),
        dropped: AtomicU64::new(0),
    });

    (
        QueueSender {
            shared: Arc::clone(&shared),
            block_timeout: config.block_timeout,
            overflow: config.overflow,
        },
        QueueReceiver { shared },
    )
}

pub struct QueueSender {
    shared: Arc<Shared>,
    block_timeout: Duration,
    overflow: OverflowPolicy,
}

impl QueueSender {
    pub async fn push(&self, message: ChatMessage) -> PushOutcome {
        let deadline = deadline_after(self.block_timeout);
        let mut message = Some(message);

        loop {
            {
                let mut buffer = self.shared.lock();
                if self.shared.is_closed() {
                    return PushOutcome::Closed;
                }
                if buffer.len() < self.shared.capacity {
                    if let Some(message) = message.take() {
                        buffer.push_back(message);
                    }
                    drop(buffer);
                    self.shared.item_ready.notify_one();
                    return PushOutcome::Queued;
                }
            }

            if time::timeout_at(deadline, self.shared.space_ready.notified())
                .await
                .is_err()
            {
                break;
            }
        }

        match message {
            Some(message) => self.settle_overflow(message),
            None => PushOutcome::Queued,
        }
    }

    /// Settles a push whose wait for room ran out. The consumer may have
    /// freed a slot since, so room is checked again before anything is lost.
    fn settle_overflow(&self, message: ChatMessage) -> PushOutcome {
        let mut buffer = self.shared.lock();
        if self.shared.is_closed() {
            return PushOutcome::Closed;
        }

        let outcome = if buffer.len() < self.shared.capacity {
            buffer.push_back(message);
            PushOutcome::Queued
        } else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            match self.overflow {
                OverflowPolicy::DropNewest => return PushOutcome::DroppedNewest,
                OverflowPolicy::DropOldest => {
                    buffer.pop_front();
                    buffer.push_back(message);
                    PushOutcome::DroppedOldest
                }
            }
        };
        drop(buffer);
        self.shared.item_ready.notify_one();
        outcome
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for QueueSender {
    fn drop(&mut self) {
        self.shared.close();
    }
}

pub struct QueueReceiver {
    shared: Arc<Shared>,
}

impl QueueReceiver {
    /// Takes the next message, waiting up to `timeout`. Messages queued before
    /// the sender closed are still delivered.
    pub async fn pop(&self, timeout: Duration) -> Pop {
        let deadline = deadline_after(timeout);

        loop {
            {
                let mut buffer = self.shared.lock();
                if let Some(message) = buffer.pop_front() {
                    drop(buffer);
                    self.shared.space_ready.notify_one();
                    return Pop::Message(message);
                }
                if self.shared.is_closed() {
                    return Pop::Closed;
                }
            }

            if time::timeout_at(deadline, self.shared.item_ready.notified())
                .await
                .is_err()
            {
                return Pop::Empty;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for QueueReceiver {
    fn drop(&mut self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn config(capacity: usize, overflow: OverflowPolicy) -> QueueConfig {
        QueueConfig {
            capacity,
            block_timeout: Duration::from_millis(50),
            overflow,
        }
    }

    fn message(text: &str) -> ChatMessage {
        ChatMessage::new(text, Instant::now())
    }

    fn text(pop: Pop) -> String {
        match pop {
            Pop::Message(message) => message.text,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_in_order_then_times_out() {
        let (tx, rx) = chat_queue(&QueueConfig::default());
        tx.push(message("a")).await;
        tx.push(message("b")).await;

        assert_eq!(text(rx.pop(Duration::from_millis(10)).await), "a");
        assert_eq!(text(rx.pop(Duration::from_millis(10)).await), "b");
        assert_eq!(rx.pop(Duration::from_millis(10)).await, Pop::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_oldest_after_blocking() {
        let (tx, rx) = chat_queue(&config(2, OverflowPolicy::DropOldest));
        assert_eq!(tx.push(message("a")).await, PushOutcome::Queued);
        assert_eq!(tx.push(message("b")).await, PushOutcome::Queued);

        let started = Instant::now();
        assert_eq!(tx.push(message("c")).await, PushOutcome::DroppedOldest);
        assert!(started.elapsed() >= Duration::from_millis(50));

        assert_eq!(text(rx.pop(Duration::ZERO).await), "b");
        assert_eq!(text(rx.pop(Duration::ZERO).await), "c");
        assert_eq!(rx.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_uses_a_slot_freed_after_the_wait() {
        let (tx, rx) = chat_queue(&config(1, OverflowPolicy::DropOldest));
        tx.push(message("a")).await;
        assert_eq!(text(rx.pop(Duration::ZERO).await), "a");

        assert_eq!(tx.settle_overflow(message("b")), PushOutcome::Queued);
        assert_eq!(text(rx.pop(Duration::ZERO).await), "b");
        assert_eq!(rx.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_block_timeout_still_waits_for_room() {
        let (tx, rx) = chat_queue(&QueueConfig {
            capacity: 1,
            block_timeout: Duration::MAX,
            overflow: OverflowPolicy::DropOldest,
        });
        tx.push(message("a")).await;

        let consumer = tokio::spawn(async move {
            time::sleep(Duration::from_secs(60)).await;
            let first = rx.pop(Duration::ZERO).await;
            (first, rx)
        });

        assert_eq!(tx.push(message("b")).await, PushOutcome::Queued);
        let (first, rx) = consumer.await.unwrap();
        assert_eq!(text(first), "a");
        assert_eq!(rx.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_can_drop_newest() {
        let (tx, rx) = chat_queue(&config(1, OverflowPolicy::DropNewest));
        tx.push(message("a")).await;

        assert_eq!(tx.push(message("b")).await, PushOutcome::DroppedNewest);
        assert_eq!(text(rx.pop(Duration::ZERO).await), "a");
        assert_eq!(rx.pop(Duration::ZERO).await, Pop::Empty);
        assert_eq!(rx.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_producer_resumes_when_consumer_catches_up() {
        let (tx, rx) = chat_queue(&config(1, OverflowPolicy::DropOldest));
        tx.push(message("a")).await;

        let consumer = tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            let first = rx.pop(Duration::ZERO).await;
            (first, rx)
        });

        assert_eq!(tx.push(message("b")).await, PushOutcome::Queued);

        let (first, rx) = consumer.await.unwrap();
        assert_eq!(text(first), "a");
        assert_eq!(text(rx.pop(Duration::ZERO).await), "b");
        assert_eq!(rx.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_wakes_on_push() {
        let (tx, rx) = chat_queue(&QueueConfig::default());

        let producer = tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            tx.push(message("late")).await;
            tx
        });

        assert_eq!(text(rx.pop(Duration::from_secs(1)).await), "late");
        drop(producer.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_sender_drains_then_reports_closed() {
        let (tx, rx) = chat_queue(&QueueConfig::default());
        tx.push(message("last words")).await;
        drop(tx);

        assert_eq!(text(rx.pop(Duration::from_millis(10)).await), "last words");
        assert_eq!(rx.pop(Duration::from_millis(10)).await, Pop::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn push_after_receiver_drop_is_closed() {
        let (tx, rx) = chat_queue(&QueueConfig::default());
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.push(message("anyone?")).await, PushOutcome::Closed);
    }
}
