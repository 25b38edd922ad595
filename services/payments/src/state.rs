use crate::domain::repository::{JobQueue, PaymentRepository, RateLimiter};
use crate::infra::beanstalk::BeanstalkQueue;
use crate::infra::cache::RedisStore;
use crate::infra::rate_limiter::FixedWindowLimiter;
use crate::infra::record_store::KvPaymentRepository;
use crate::usecase::payment::{CreatePaymentUseCase, GetPaymentUseCase};

/// Shared application state passed to every handler via axum `State`.
///
/// Generic over its ports so handlers can be exercised against in-memory
/// backends; production uses [`RedisAppState`].
#[derive(Clone)]
pub struct AppState<L, R, Q> {
    pub limiter: L,
    pub payments: R,
    pub queue: Q,
}

pub type RedisAppState = AppState<
    FixedWindowLimiter<RedisStore>,
    KvPaymentRepository<RedisStore>,
    BeanstalkQueue,
>;

impl<L, R, Q> AppState<L, R, Q>
where
    L: RateLimiter + Clone,
    R: PaymentRepository + Clone,
    Q: JobQueue + Clone,
{
    pub fn create_payment_usecase(&self) -> CreatePaymentUseCase<L, R, Q> {
        CreatePaymentUseCase {
            limiter: self.limiter.clone(),
            payments: self.payments.clone(),
            queue: self.queue.clone(),
        }
    }

    pub fn get_payment_usecase(&self) -> GetPaymentUseCase<R> {
        GetPaymentUseCase {
            payments: self.payments.clone(),
        }
    }
}
