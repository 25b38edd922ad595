use payflow_domain::id::PaymentId;

/// Broker-assigned handle of a reserved job. Only meaningful to the consumer
/// that reserved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(pub u64);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A job handed to a worker by `JobConsumer::reserve`.
#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub handle: JobHandle,
    pub payload: Vec<u8>,
}

/// Store key of a payment record.
pub fn payment_key(id: PaymentId) -> String {
    format!("payment:{id}")
}

/// Store key of a user's admission counter. Disjoint from `payment_key`.
pub fn rate_limit_key(user_id: &str) -> String {
    format!("rate-limit-key:user-{user_id}")
}

/// Priority every payment job is published with (beanstalkd: lower is more urgent).
pub const JOB_PRIORITY: u32 = 1;

/// Priority a poison job is buried with.
pub const BURY_PRIORITY: u32 = 0;
