pub mod beanstalk;
pub mod cache;
pub mod rate_limiter;
pub mod record_store;
