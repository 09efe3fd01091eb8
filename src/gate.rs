//! Admission gate bounding the number of outstanding upstream requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Counting gate: a caller proceeds only while fewer than `capacity`
/// admissions are held, otherwise it waits for one to be released.
#[derive(Debug)]
pub struct AdmissionGate {
    permits: Semaphore,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Held for the duration of one request. Dropping it frees the slot.
#[derive(Debug)]
pub struct Admission<'a> {
    gate: &'a AdmissionGate,
    _permit: SemaphorePermit<'a>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Semaphore::new(capacity),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub async fn admit(&self) -> Admission<'_> {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("admission gate semaphore is never closed");

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Admission {
            gate: self,
            _permit: permit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous admissions seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Duration;

    async fn hold(gate: &AdmissionGate, ms: u64) -> usize {
        let _admission = gate.admit().await;
        let seen = gate.in_flight();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        seen
    }

    #[tokio::test]
    async fn never_admits_more_than_capacity() {
        for capacity in [1, 2, 5, 8] {
            let gate = AdmissionGate::new(capacity);

            let seen = join_all((0..20).map(|i| hold(&gate, 5 + (i % 3)))).await;

            assert!(seen.iter().all(|&n| n <= capacity));
            assert_eq!(gate.peak(), capacity);
            assert_eq!(gate.in_flight(), 0);
        }
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped_to_one() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.capacity(), 1);

        join_all((0..4).map(|_| hold(&gate, 1))).await;
        assert_eq!(gate.peak(), 1);
    }

    #[tokio::test]
    async fn dropping_an_admission_frees_the_slot() {
        let gate = AdmissionGate::new(1);

        let first = gate.admit().await;
        assert_eq!(gate.in_flight(), 1);
        drop(first);

        let second = tokio::time::timeout(Duration::from_millis(100), gate.admit()).await;
        assert!(second.is_ok());
    }
}
