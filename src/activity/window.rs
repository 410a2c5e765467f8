use std::collections::VecDeque;

use tokio::time::{Duration, Instant};

/// Bounded, non-decreasing sequence of message arrival instants.
///
/// Eviction is count-based: once `capacity` instants are held, pushing a new
/// one drops the oldest.
#[derive(Debug, Clone)]
pub struct TimestampWindow {
    instants: VecDeque<Instant>,
    capacity: usize,
}

impl TimestampWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            instants: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an arrival. Instants older than the newest retained one are
    /// clamped to it so the sequence never goes backwards.
    pub fn push(&mut self, instant: Instant) {
        let instant = match self.instants.back() {
            Some(&newest) if instant < newest => newest,
            _ => instant,
        };

        if self.instants.len() == self.capacity {
            self.instants.pop_front();
        }
        self.instants.push_back(instant);
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<Instant> {
        self.instants.front().copied()
    }

    pub fn newest(&self) -> Option<Instant> {
        self.instants.back().copied()
    }

    /// Time between the oldest and newest retained instants.
    pub fn span(&self) -> Duration {
        match (self.oldest(), self.newest()) {
            (Some(oldest), Some(newest)) => newest.saturating_duration_since(oldest),
            _ => Duration::ZERO,
        }
    }

    pub fn clear(&mut self) {
        self.instants.clear();
    }
}
