use payflow_domain::id::PaymentId;
use payflow_domain::job::Job;
use payflow_domain::payment::{Payment, PaymentStatus};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::repository::{JobQueue, PaymentRepository, RateLimiter};
use crate::error::PaymentServiceError;

// ── CreatePayment ────────────────────────────────────────────────────────────

pub struct CreatePaymentInput {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Admit, persist, enqueue, and mark a payment as queued.
///
/// Returns the record as it was created (`pending`); poll by id for the
/// current status.
///
/// Every step depends on the previous one and nothing is rolled back: a failed
/// publish leaves the record `pending`, and a failed final status write leaves
/// it `pending` although its job is already on the queue.
pub struct CreatePaymentUseCase<L, R, Q>
where
    L: RateLimiter,
    R: PaymentRepository,
    Q: JobQueue,
{
    pub limiter: L,
    pub payments: R,
    pub queue: Q,
}

impl<L, R, Q> CreatePaymentUseCase<L, R, Q>
where
    L: RateLimiter,
    R: PaymentRepository,
    Q: JobQueue,
{
    pub async fn execute(&self, input: CreatePaymentInput) -> Result<Payment, PaymentServiceError> {
        // 1. Admission → 429 when the user's window budget is spent
        if !self.limiter.allow(&input.user_id).await? {
            debug!(user_id = %input.user_id, "payment refused by rate limiter");
            return Err(PaymentServiceError::RateLimitExceeded);
        }

        // 2. Identity is fixed before any side effect so store key and job agree
        let payment = Payment::new(input.user_id, input.amount, input.currency);
        self.payments.create(&payment).await?;

        // 3. Hand off to the queue
        let job =
            Job::for_payment(&payment).map_err(|e| PaymentServiceError::Internal(e.into()))?;
        self.queue.publish(&job).await?;

        // 4. Record the hand-off; the caller still gets the record as created
        self.payments
            .update_status(payment.id, PaymentStatus::Queued)
            .await?;

        info!(
            payment_id = %payment.id,
            user_id = %payment.user_id,
            amount = %payment.amount,
            currency = %payment.currency,
            "payment queued"
        );
        Ok(payment)
    }
}

// ── GetPayment ───────────────────────────────────────────────────────────────

pub struct GetPaymentUseCase<R: PaymentRepository> {
    pub payments: R,
}

impl<R: PaymentRepository> GetPaymentUseCase<R> {
    pub async fn execute(&self, id: PaymentId) -> Result<Payment, PaymentServiceError> {
        self.payments
            .find_by_id(id)
            .await?
            .ok_or(PaymentServiceError::PaymentNotFound)
    }
}
