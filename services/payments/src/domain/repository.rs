use std::future::Future;
use std::time::Duration;

use payflow_domain::id::PaymentId;
use payflow_domain::job::Job;
use payflow_domain::payment::{Payment, PaymentStatus};

use crate::domain::types::{JobHandle, ReservedJob};
use crate::error::PaymentServiceError;

/// Minimal key-value capability shared by the record store and the admission
/// limiter. Implementations report every backend failure as
/// `PaymentServiceError::StoreUnavailable`.
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; `None` when the key is absent or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, PaymentServiceError>> + Send;

    /// Write a value, replacing any previous one. `ttl: None` means no expiry.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;

    /// Atomically increment an integer counter, creating it at 0 first if absent.
    /// Returns the post-increment value.
    fn incr(&self, key: &str) -> impl Future<Output = Result<i64, PaymentServiceError>> + Send;

    /// Set the time-to-live of an existing key.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;
}

/// Persistence of payment records.
pub trait PaymentRepository: Send + Sync {
    /// Store `payment` with status forced to `pending`, whatever the caller set.
    fn create(
        &self,
        payment: &Payment,
    ) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;

    /// Read-modify-write of the status. Not atomic: two concurrent updaters of the
    /// same id race and the last write wins. Fails with `PaymentNotFound` when the
    /// record is absent. Returns the record as written.
    fn update_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> impl Future<Output = Result<Payment, PaymentServiceError>> + Send;

    fn find_by_id(
        &self,
        id: PaymentId,
    ) -> impl Future<Output = Result<Option<Payment>, PaymentServiceError>> + Send;
}

/// Per-subject admission control.
pub trait RateLimiter: Send + Sync {
    /// `Ok(false)` means the subject's budget for the current window is spent.
    fn allow(
        &self,
        subject: &str,
    ) -> impl Future<Output = Result<bool, PaymentServiceError>> + Send;
}

/// Producer side of the work queue.
pub trait JobQueue: Send + Sync {
    /// Hand a job to the broker. A rejected write is an error, never a silent drop.
    fn publish(&self, job: &Job) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;
}

/// Consumer side of the work queue. Reservations are bound to the consumer that
/// made them, hence `&mut self`.
pub trait JobConsumer: Send {
    /// Wait up to `timeout` for a job. `Ok(None)` when nothing arrived in time.
    /// A reservation not acknowledged within the broker's visibility window is
    /// redelivered, possibly to another consumer.
    fn reserve(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<ReservedJob>, PaymentServiceError>> + Send;

    /// Remove a finished job from the queue.
    fn acknowledge(
        &mut self,
        handle: JobHandle,
    ) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;

    /// Give up a reservation; the job becomes ready again after `delay`.
    fn release(
        &mut self,
        handle: JobHandle,
        delay: Duration,
    ) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;

    /// Take a job out of normal redelivery without completing it (bury).
    fn fail_permanently(
        &mut self,
        handle: JobHandle,
    ) -> impl Future<Output = Result<(), PaymentServiceError>> + Send;
}
