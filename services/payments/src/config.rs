use std::time::Duration;

use crate::worker::WorkerSettings;

/// Payments service configuration loaded from environment variables.
/// Shared by the `api` and `worker` binaries.
#[derive(Debug)]
pub struct PaymentsConfig {
    /// Redis connection URL for payment records and admission counters.
    pub redis_url: String,
    /// beanstalkd address (`host:port`). Env var: `BEANSTALK_ADDR`.
    pub beanstalk_addr: String,
    /// Tube payment jobs are published to (default "payments").
    pub beanstalk_tube: String,
    /// TCP port for the HTTP server (default 8080). Env var: `PAYMENTS_PORT`.
    pub payments_port: u16,
    /// Admissions per user per window (default 5).
    pub rate_limit: u64,
    /// Admission window (default 60 s). Env var: `RATE_LIMIT_WINDOW_SECS`.
    pub rate_limit_window: Duration,
    /// Record lifetime; zero keeps records forever. Env var: `PAYMENT_TTL_SECS`.
    pub payment_ttl: Duration,
    /// Visibility window of a reserved job (default 30 s). Env var: `JOB_TTR_SECS`.
    pub job_ttr: Duration,
    /// Worker tasks started by the worker binary (default 1).
    pub max_workers: usize,
    pub worker_reserve_timeout: Duration,
    pub worker_backoff: Duration,
    pub worker_processing_delay: Duration,
    /// How long a binary waits for in-flight work after a shutdown signal.
    pub shutdown_grace: Duration,
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl PaymentsConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL"),
            beanstalk_addr: std::env::var("BEANSTALK_ADDR").expect("BEANSTALK_ADDR"),
            beanstalk_tube: std::env::var("BEANSTALK_TUBE")
                .unwrap_or_else(|_| "payments".to_owned()),
            payments_port: var_or("PAYMENTS_PORT", 8080),
            rate_limit: var_or("RATE_LIMIT", 5),
            rate_limit_window: Duration::from_secs(var_or("RATE_LIMIT_WINDOW_SECS", 60)),
            payment_ttl: Duration::from_secs(var_or("PAYMENT_TTL_SECS", 0)),
            job_ttr: Duration::from_secs(var_or("JOB_TTR_SECS", 30)),
            max_workers: var_or("MAX_WORKERS", 1usize).max(1),
            worker_reserve_timeout: Duration::from_secs(var_or("WORKER_RESERVE_TIMEOUT_SECS", 5)),
            worker_backoff: Duration::from_secs(var_or("WORKER_BACKOFF_SECS", 5)),
            worker_processing_delay: Duration::from_millis(var_or("WORKER_PROCESSING_MS", 3000)),
            shutdown_grace: Duration::from_secs(var_or("SHUTDOWN_GRACE_SECS", 10)),
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            reserve_timeout: self.worker_reserve_timeout,
            backoff: self.worker_backoff,
            processing_delay: self.worker_processing_delay,
        }
    }
}
