//! Queue-draining worker loop.
//!
//! Each worker reserves one job at a time, decodes the payment snapshot it
//! carries, simulates gateway work, and moves the record to `completed`.
//! Delivery is at-least-once: a job whose reservation lapses is handed out
//! again, so every step must tolerate running twice for the same payment.

use std::time::Duration;

use payflow_domain::id::PaymentId;
use payflow_domain::job::decode_payload;
use payflow_domain::payment::PaymentStatus;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::repository::{JobConsumer, PaymentRepository};
use crate::domain::types::{JobHandle, ReservedJob};
use crate::error::PaymentServiceError;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Upper bound of one reservation wait; also bounds shutdown latency.
    pub reserve_timeout: Duration,
    /// Fixed pause after a failed reservation, and the delay before a released
    /// job is handed out again.
    pub backoff: Duration,
    /// Stand-in for payment-gateway latency.
    pub processing_delay: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            reserve_timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(5),
            processing_delay: Duration::from_secs(3),
        }
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reservation timed out with no job.
    Idle,
    /// The reservation itself failed; the loop backs off before retrying.
    ReserveFailed,
    /// Payment moved to `completed` and its job acknowledged.
    Completed(PaymentId),
    /// Job removed from redelivery without completing it.
    Buried(JobHandle),
    /// Job handed back to the broker for a delayed retry.
    Released(JobHandle),
    /// Job left reserved; the broker redelivers it when the reservation lapses.
    Abandoned(JobHandle),
}

pub struct Worker<R, C> {
    id: usize,
    payments: R,
    consumer: C,
    settings: WorkerSettings,
}

impl<R, C> Worker<R, C>
where
    R: PaymentRepository,
    C: JobConsumer,
{
    pub fn new(id: usize, payments: R, consumer: C, settings: WorkerSettings) -> Self {
        Self {
            id,
            payments,
            consumer,
            settings,
        }
    }

    /// Drain the queue until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Cancellation is only checked between iterations; an in-flight reservation
    /// wait or processing step always runs to completion.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "worker started");
        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }
            if self.poll_once().await == Outcome::ReserveFailed {
                tokio::time::sleep(self.settings.backoff).await;
            }
        }
        info!(worker = self.id, "worker stopped");
    }

    /// Reserve and handle at most one job.
    pub async fn poll_once(&mut self) -> Outcome {
        match self.consumer.reserve(self.settings.reserve_timeout).await {
            Ok(Some(job)) => self.handle(job).await,
            Ok(None) => Outcome::Idle,
            Err(e) => {
                error!(worker = self.id, error = %e, "error reserving job");
                Outcome::ReserveFailed
            }
        }
    }

    async fn handle(&mut self, job: ReservedJob) -> Outcome {
        let payment = match decode_payload(&job.payload) {
            Ok(payment) => payment,
            Err(e) => {
                let e = PaymentServiceError::from(e);
                warn!(
                    worker = self.id,
                    job = %job.handle,
                    kind = e.kind(),
                    error = %e,
                    "burying undecodable job"
                );
                return self.bury(job.handle).await;
            }
        };

        info!(
            worker = self.id,
            job = %job.handle,
            payment_id = %payment.id,
            user_id = %payment.user_id,
            amount = %payment.amount,
            currency = %payment.currency,
            "processing payment"
        );

        if let Err(e) = self
            .payments
            .update_status(payment.id, PaymentStatus::Processing)
            .await
        {
            return self.on_update_failure(job.handle, payment.id, e).await;
        }

        tokio::time::sleep(self.settings.processing_delay).await;

        if let Err(e) = self
            .payments
            .update_status(payment.id, PaymentStatus::Completed)
            .await
        {
            return self.on_update_failure(job.handle, payment.id, e).await;
        }

        match self.consumer.acknowledge(job.handle).await {
            Ok(()) => {
                info!(worker = self.id, payment_id = %payment.id, "payment processed");
                Outcome::Completed(payment.id)
            }
            Err(e) => {
                // The record is already completed; a redelivery repeats the same writes.
                error!(worker = self.id, job = %job.handle, error = %e, "error acknowledging job");
                Outcome::Abandoned(job.handle)
            }
        }
    }

    async fn on_update_failure(
        &mut self,
        handle: JobHandle,
        payment_id: PaymentId,
        e: PaymentServiceError,
    ) -> Outcome {
        match e {
            PaymentServiceError::PaymentNotFound => {
                warn!(worker = self.id, job = %handle, %payment_id, "record missing, burying job");
                self.bury(handle).await
            }
            other => {
                error!(
                    worker = self.id,
                    job = %handle,
                    %payment_id,
                    error = %other,
                    "status update failed, releasing job for retry"
                );
                self.release(handle).await
            }
        }
    }

    async fn release(&mut self, handle: JobHandle) -> Outcome {
        match self.consumer.release(handle, self.settings.backoff).await {
            Ok(()) => Outcome::Released(handle),
            Err(e) => {
                error!(worker = self.id, job = %handle, error = %e, "error releasing job");
                Outcome::Abandoned(handle)
            }
        }
    }

    async fn bury(&mut self, handle: JobHandle) -> Outcome {
        match self.consumer.fail_permanently(handle).await {
            Ok(()) => Outcome::Buried(handle),
            Err(e) => {
                error!(worker = self.id, job = %handle, error = %e, "error burying job");
                Outcome::Abandoned(handle)
            }
        }
    }
}
