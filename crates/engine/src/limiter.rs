//! Bound on upload chunks in flight.

use std::sync::Mutex;

/// Counts chunks handed to the source plugin and not yet reported done.
///
/// Check and increment happen under one lock so concurrent submitters
/// never overshoot the maximum.
#[derive(Debug)]
pub(crate) struct UploadLimiter {
    max: usize,
    in_flight: Mutex<usize>,
}

impl UploadLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            in_flight: Mutex::new(0),
        }
    }

    /// Takes one unit if the maximum has not been reached.
    pub fn try_acquire(&self) -> bool {
        match self.in_flight.lock() {
            Ok(mut count) if *count < self.max => {
                *count += 1;
                true
            }
            _ => false,
        }
    }

    pub fn release(&self) {
        if let Ok(mut count) = self.in_flight.lock() {
            *count = count.saturating_sub(1);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|c| *c).unwrap_or(self.max)
    }
}
