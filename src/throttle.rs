//! Shared gas budget protecting the executor from overload.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use crate::{config::ThrottleConfig, error::Error};

struct Bucket {
    available: u64,
    refilled_at: Instant,
}

pub struct GasBucket {
    capacity: u64,
    refund_percent: u64,
    refill_per_second: u64,
    bucket: Mutex<Bucket>,
}

impl GasBucket {
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            capacity: config.gas_capacity,
            refund_percent: config.refund_percent.min(100),
            refill_per_second: config.refill_per_second,
            bucket: Mutex::new(Bucket {
                available: config.gas_capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.available
    }

    fn refill(&self, bucket: &mut Bucket) {
        if self.refill_per_second == 0 || bucket.available >= self.capacity {
            bucket.refilled_at = Instant::now();
            return;
        }
        let elapsed = bucket.refilled_at.elapsed().as_nanos();
        let added = elapsed * self.refill_per_second as u128 / 1_000_000_000;
        if added > 0 {
            let added = u64::try_from(added).unwrap_or(u64::MAX);
            bucket.available = bucket.available.saturating_add(added).min(self.capacity);
            bucket.refilled_at = Instant::now();
        }
    }

    /// Takes `gas` out of the bucket until the returned guard is dropped.
    pub fn reserve(&self, gas: u64) -> Result<GasReservation<'_>, Error> {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if gas > bucket.available {
            warn!(requested = gas, available = bucket.available, "gas bucket exhausted");
            return Err(Error::Throttled {
                requested: gas,
                available: bucket.available,
            });
        }
        bucket.available -= gas;
        Ok(GasReservation {
            bucket: self,
            gas_limit: gas,
            gas_used: None,
        })
    }

    fn restore(&self, gas: u64) {
        let mut bucket = self.bucket.lock();
        bucket.available = bucket.available.saturating_add(gas).min(self.capacity);
    }
}

/// Outstanding reservation. Dropping it returns
/// `min(gas_limit - gas_used, gas_limit * refund_percent / 100)` to the
/// bucket, exactly once, on every exit path.
pub struct GasReservation<'a> {
    bucket: &'a GasBucket,
    gas_limit: u64,
    gas_used: Option<u64>,
}

impl GasReservation<'_> {
    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn record_used(&mut self, gas_used: u64) {
        self.gas_used = Some(gas_used.min(self.gas_limit));
    }

    fn refund(&self) -> u64 {
        let unused = self.gas_limit - self.gas_used.unwrap_or(0);
        let cap = (self.gas_limit as u128 * self.bucket.refund_percent as u128 / 100) as u64;
        unused.min(cap)
    }
}

impl Drop for GasReservation<'_> {
    fn drop(&mut self) {
        self.bucket.restore(self.refund());
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        thread,
        time::Duration,
    };

    use super::*;

    fn bucket(capacity: u64, refund_percent: u64, refill_per_second: u64) -> GasBucket {
        GasBucket::new(&ThrottleConfig {
            gas_capacity: capacity,
            refund_percent,
            refill_per_second,
        })
    }

    #[test]
    fn test_restore_is_capped_by_refund_percent() {
        let bucket = bucket(1_000_000, 10, 0);
        {
            let mut reservation = bucket.reserve(100_000).unwrap();
            assert_eq!(bucket.available(), 900_000);
            reservation.record_used(21_000);
        }
        assert_eq!(bucket.available(), 910_000);
        {
            let mut reservation = bucket.reserve(100_000).unwrap();
            reservation.record_used(95_000);
        }
        assert_eq!(bucket.available(), 815_000);
    }

    #[test]
    fn test_restore_on_early_exit() {
        let bucket = bucket(1_000_000, 100, 0);
        let failing = || -> Result<(), Error> {
            let _reservation = bucket.reserve(400_000)?;
            Err(Error::NegativeValue)
        };
        assert!(failing().is_err());
        assert_eq!(bucket.available(), 1_000_000);
    }

    #[test]
    fn test_throttled_when_exhausted() {
        let bucket = bucket(100_000, 10, 0);
        let _held = bucket.reserve(80_000).unwrap();
        let err = bucket.reserve(30_000).err().unwrap();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            Error::Throttled {
                requested: 30_000,
                available: 20_000
            }
        ));
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let bucket = bucket(1_000, 0, 1_000_000_000);
        {
            let _spent = bucket.reserve(1_000).unwrap();
        }
        thread::sleep(Duration::from_millis(5));
        assert_eq!(bucket.available(), 1_000);
    }

    #[test]
    fn test_concurrent_reservations_stay_within_capacity() {
        const CAPACITY: u64 = 1_000_000;
        let bucket = Arc::new(bucket(CAPACITY, 100, 0));
        let outstanding = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bucket = bucket.clone();
                let outstanding = outstanding.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    for round in 0..200u64 {
                        let gas = 50_000 + (i * 7_919 + round * 104_729) % 250_000;
                        let Ok(_reservation) = bucket.reserve(gas) else {
                            continue;
                        };
                        let now = outstanding.fetch_add(gas, Ordering::SeqCst) + gas;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        outstanding.fetch_sub(gas, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
        assert_eq!(bucket.available(), CAPACITY);
    }
}
