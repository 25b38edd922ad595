use std::time::Duration;

use anyhow::Context;
use tracing::debug;
use payflow_domain::id::PaymentId;
use payflow_domain::payment::{Payment, PaymentStatus};

use crate::domain::repository::{KeyValueStore, PaymentRepository};
use crate::domain::types::payment_key;
use crate::error::PaymentServiceError;

/// Payment records stored as JSON under `payment:{id}`.
///
/// Status updates are read-modify-write without versioning, so concurrent
/// updaters of one record race and the last write wins.
#[derive(Clone)]
pub struct KvPaymentRepository<K> {
    store: K,
    ttl: Option<Duration>,
}

impl<K: KeyValueStore> KvPaymentRepository<K> {
    /// A zero `ttl` keeps records forever.
    pub fn new(store: K, ttl: Duration) -> Self {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        Self { store, ttl }
    }

    async fn write(&self, payment: &Payment) -> Result<(), PaymentServiceError> {
        let data = serde_json::to_vec(payment).context("serialize payment record")?;
        self.store.set(&payment_key(payment.id), data, self.ttl).await
    }
}

impl<K: KeyValueStore> PaymentRepository for KvPaymentRepository<K> {
    async fn create(&self, payment: &Payment) -> Result<(), PaymentServiceError> {
        let mut record = payment.clone();
        record.status = PaymentStatus::Pending;
        self.write(&record).await
    }

    async fn update_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, PaymentServiceError> {
        let mut record = self
            .find_by_id(id)
            .await?
            .ok_or(PaymentServiceError::PaymentNotFound)?;
        let previous = record.status;
        record.transition(status);
        self.write(&record).await?;
        debug!(payment_id = %id, from = %previous, to = %status, "payment status updated");
        Ok(record)
    }

    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, PaymentServiceError> {
        let Some(data) = self.store.get(&payment_key(id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&data)
            .with_context(|| format!("corrupt payment record {id}"))?;
        Ok(Some(record))
    }
}
