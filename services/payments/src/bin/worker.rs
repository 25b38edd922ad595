use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use payflow_core::shutdown::shutdown_signal;
use payflow_core::tracing::init_tracing;
use payflow_payments::config::PaymentsConfig;
use payflow_payments::infra::beanstalk::BeanstalkConsumer;
use payflow_payments::infra::cache::RedisStore;
use payflow_payments::infra::record_store::KvPaymentRepository;
use payflow_payments::worker::Worker;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = PaymentsConfig::from_env();

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");
    let payments = KvPaymentRepository::new(RedisStore::new(redis), config.payment_ttl);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(config.max_workers);
    for id in 0..config.max_workers {
        // One broker connection per worker: reservations belong to the connection.
        let consumer = BeanstalkConsumer::connect(&config.beanstalk_addr, &config.beanstalk_tube)
            .await
            .expect("failed to connect to beanstalkd");
        let worker = Worker::new(id, payments.clone(), consumer, config.worker_settings());
        handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }
    info!(
        workers = config.max_workers,
        tube = %config.beanstalk_tube,
        "payment workers started"
    );

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_grace, join_all(handles)).await {
        Ok(_) => info!("payment workers stopped"),
        Err(_) => warn!(
            grace_secs = config.shutdown_grace.as_secs(),
            "workers still busy after grace period, exiting"
        ),
    }
}
