use tracing::info;

use payflow_core::shutdown::shutdown_signal;
use payflow_core::tracing::init_tracing;
use payflow_payments::config::PaymentsConfig;
use payflow_payments::infra::beanstalk::BeanstalkQueue;
use payflow_payments::infra::cache::RedisStore;
use payflow_payments::infra::rate_limiter::FixedWindowLimiter;
use payflow_payments::infra::record_store::KvPaymentRepository;
use payflow_payments::router::build_router;
use payflow_payments::state::RedisAppState;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = PaymentsConfig::from_env();

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");
    let store = RedisStore::new(redis);

    let queue = BeanstalkQueue::connect(
        &config.beanstalk_addr,
        &config.beanstalk_tube,
        config.job_ttr,
    )
    .await
    .expect("failed to connect to beanstalkd");

    let state = RedisAppState {
        limiter: FixedWindowLimiter::new(
            store.clone(),
            config.rate_limit,
            config.rate_limit_window,
        ),
        payments: KvPaymentRepository::new(store, config.payment_ttl),
        queue,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.payments_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!(
        %addr,
        tube = %config.beanstalk_tube,
        rate_limit = config.rate_limit,
        "payments api listening"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("payments api stopped");
}
