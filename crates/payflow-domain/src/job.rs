//! Work-queue job carrying a payment snapshot.

use crate::id::PaymentId;
use crate::payment::Payment;

/// A unit of work handed to the queue. It has no identity of its own: `id` is the
/// payment's id and `payload` is the payment serialized at enqueue time.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: PaymentId,
    pub payload: Vec<u8>,
}

impl Job {
    /// Snapshot `payment` into a job payload.
    pub fn for_payment(payment: &Payment) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: payment.id,
            payload: serde_json::to_vec(payment)?,
        })
    }
}

/// Decode a reserved job body back into the payment snapshot it was built from.
pub fn decode_payload(payload: &[u8]) -> Result<Payment, serde_json::Error> {
    serde_json::from_slice(payload)
}
