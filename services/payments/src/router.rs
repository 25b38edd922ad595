use axum::{Router, routing::get, routing::post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use payflow_core::health::{health, healthz, readyz};
use payflow_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::domain::repository::{JobQueue, PaymentRepository, RateLimiter};
use crate::handlers::payment::{create_payment, get_payment};
use crate::state::AppState;

pub fn build_router<L, R, Q>(state: AppState<L, R, Q>) -> Router
where
    L: RateLimiter + Clone + 'static,
    R: PaymentRepository + Clone + 'static,
    Q: JobQueue + Clone + 'static,
{
    Router::new()
        // Health
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Payments
        .route("/payments", post(create_payment::<L, R, Q>))
        .route("/payments/{id}", get(get_payment::<L, R, Q>))
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        )
        .with_state(state)
}
