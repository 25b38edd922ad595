use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Json, http::StatusCode};
use chrono::{DateTime, Utc};
use payflow_domain::id::PaymentId;
use payflow_domain::payment::{Payment, PaymentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::repository::{JobQueue, PaymentRepository, RateLimiter};
use crate::error::PaymentServiceError;
use crate::state::AppState;
use crate::usecase::payment::CreatePaymentInput;

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(serialize_with = "payflow_core::serde::to_rfc3339_ms")]
    pub initiated_at: DateTime<Utc>,
    #[serde(serialize_with = "payflow_core::serde::to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id.to_string(),
            user_id: p.user_id,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            initiated_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

// ── POST /payments ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
}

impl CreatePaymentRequest {
    fn validate(&self) -> Result<(), PaymentServiceError> {
        if self.user_id.trim().is_empty()
            || self.amount <= Decimal::ZERO
            || self.currency.trim().is_empty()
        {
            return Err(PaymentServiceError::InvalidRequest(
                "user_id, amount, and currency are required".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct CreatePaymentResponse {
    pub status: &'static str,
    pub data: PaymentResponse,
    pub message: &'static str,
}

pub async fn create_payment<L, R, Q>(
    State(state): State<AppState<L, R, Q>>,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), PaymentServiceError>
where
    L: RateLimiter + Clone,
    R: PaymentRepository + Clone,
    Q: JobQueue + Clone,
{
    let Json(body) = body
        .map_err(|e| PaymentServiceError::InvalidRequest(format!("invalid payload: {e}")))?;
    body.validate()?;

    let payment = state
        .create_payment_usecase()
        .execute(CreatePaymentInput {
            user_id: body.user_id,
            amount: body.amount,
            currency: body.currency,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            status: "success",
            data: payment.into(),
            message: "Payment queued successfully",
        }),
    ))
}

// ── GET /payments/{id} ───────────────────────────────────────────────────────

pub async fn get_payment<L, R, Q>(
    State(state): State<AppState<L, R, Q>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, PaymentServiceError>
where
    L: RateLimiter + Clone,
    R: PaymentRepository + Clone,
    Q: JobQueue + Clone,
{
    // A string that is not a payment id cannot name an existing record.
    let id: PaymentId = id.parse().map_err(|_| PaymentServiceError::PaymentNotFound)?;
    let payment = state.get_payment_usecase().execute(id).await?;
    Ok(Json(payment.into()))
}
