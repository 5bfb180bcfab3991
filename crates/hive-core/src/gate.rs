use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting admission gate. At most `capacity` [`Admission`]s exist at once;
/// waiters are woken in FIFO order as admissions drop.
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub async fn acquire(self: &Arc<Self>) -> Result<Admission, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        hive_obs::inflight_inc();
        Ok(Admission { _permit: permit, gate: self.clone() })
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn in_flight(&self) -> usize { self.in_flight.load(Ordering::SeqCst) }

    /// Highest in-flight count seen since creation.
    pub fn peak(&self) -> usize { self.peak.load(Ordering::SeqCst) }
}

/// Held for the duration of one admitted unit of work.
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    gate: Arc<AdmissionGate>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        // counter drops before the permit field, so a woken waiter never sees
        // capacity + 1
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
        hive_obs::inflight_dec();
    }
}
