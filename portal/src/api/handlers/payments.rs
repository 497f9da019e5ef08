use crate::{
    AppState,
    api::{
        handlers::owner_filter,
        models::{
            payments::{PaymentResponse, TransferResponse},
            users::CurrentUser,
        },
    },
    auth::RequiresAdmin,
    db::models::payments::PaymentUpdateDBRequest,
    errors::{Error, Result},
    types::PaymentId,
    views::{self, ListQuery, csv::CsvExport},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use tracing::info;

#[utoipa::path(
    get,
    path = "/payments",
    tag = "payments",
    summary = "List payments",
    description = "Admins see every payment, clients their own. Filter by `status` and `type` (`initial` or `final`).",
    params(ListQuery),
    responses(
        (status = 200, description = "Filtered, sorted payments", body = Vec<PaymentResponse>),
        (status = 400, description = "Unknown sort field"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_payments(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PaymentResponse>>> {
    let rows = state.store.list_payments(&owner_filter(&current_user)).await?;
    let rows = views::apply(rows, &query)?;
    Ok(Json(rows.into_iter().map(PaymentResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/payments/export",
    tag = "payments",
    summary = "Export payments as CSV",
    params(ListQuery),
    responses(
        (status = 200, description = "CSV document", content_type = "text/csv"),
        (status = 400, description = "Unknown sort field"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn export_payments(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<CsvExport> {
    let rows = state.store.list_payments(&owner_filter(&current_user)).await?;
    let rows = views::apply(rows, &query)?;
    CsvExport::new(&rows, Utc::now().date_naive())
}

#[utoipa::path(
    post,
    path = "/payments/{id}/refund",
    tag = "payments",
    summary = "Mark a payment as refunded",
    description = "Records a refund issued outside the portal. Only succeeded payments can be refunded.",
    params(("id" = uuid::Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment refunded", body = PaymentResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment has not succeeded"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn refund_payment(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(id): Path<PaymentId>,
) -> Result<Json<PaymentResponse>> {
    let payment = state.store.get_payment(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Payment".to_string(),
        id: id.to_string(),
    })?;
    let next = payment.status.refund()?;
    let updated = state
        .store
        .update_payment(
            id,
            &PaymentUpdateDBRequest {
                expected_status: payment.status,
                status: next,
            },
        )
        .await?;

    info!("Payment {} marked refunded by {}", id, admin.id);
    Ok(Json(updated.into()))
}

#[utoipa::path(
    get,
    path = "/transfers",
    tag = "payments",
    summary = "List payout transfers",
    params(ListQuery),
    responses(
        (status = 200, description = "Transfers issued from the fund split", body = Vec<TransferResponse>),
        (status = 400, description = "Unknown sort field"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_transfers(
    State(state): State<AppState>,
    RequiresAdmin(_admin): RequiresAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TransferResponse>>> {
    let rows = views::apply(state.store.list_transfers().await?, &query)?;
    Ok(Json(rows.into_iter().map(TransferResponse::from).collect()))
}
