use crate::{
    AppState,
    api::{
        handlers::owner_filter,
        models::{
            invoices::{InvoiceCreate, InvoiceResponse, InvoiceStats},
            users::CurrentUser,
        },
    },
    auth::RequiresAdmin,
    db::models::{
        invoices::{InvoiceCreateDBRequest, InvoiceDBResponse, InvoiceItem, InvoiceUpdateDBRequest},
        users::UserStatus,
    },
    errors::{Error, Result},
    lifecycle::invoice::{InvoiceAction, InvoiceStatus},
    money::Currency,
    types::{InvoiceId, Operation},
    views::{self, ListQuery, csv::CsvExport},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

async fn load_invoice(state: &AppState, id: InvoiceId) -> Result<InvoiceDBResponse> {
    state.store.get_invoice(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Invoice".to_string(),
        id: id.to_string(),
    })
}

fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("INV-{}-{suffix}", now.format("%Y%m%d"))
}

/// Price each line and total them, rejecting lines that cannot be billed
fn price_items(items: &[crate::api::models::invoices::InvoiceItemCreate]) -> Result<(Vec<InvoiceItem>, i64)> {
    if items.is_empty() {
        return Err(Error::BadRequest {
            message: "An invoice needs at least one line item".to_string(),
        });
    }

    let overflow = || Error::BadRequest {
        message: "Invoice total is too large".to_string(),
    };
    let mut total: i64 = 0;
    let mut priced = Vec::with_capacity(items.len());
    for item in items {
        let description = item.description.trim();
        if description.is_empty() || item.quantity <= 0 || item.unit_price < 0 {
            return Err(Error::BadRequest {
                message: "Line items need a description, a positive quantity and a non-negative unit price".to_string(),
            });
        }
        let amount = item.quantity.checked_mul(item.unit_price).ok_or_else(overflow)?;
        total = total.checked_add(amount).ok_or_else(overflow)?;
        priced.push(InvoiceItem {
            description: description.to_string(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            amount,
        });
    }
    Ok((priced, total))
}

/// Totals over `invoices`, counting amounts only in `currency`. Sums saturate at `i64::MAX`.
pub(crate) fn invoice_stats(invoices: &[InvoiceDBResponse], currency: Currency, now: DateTime<Utc>) -> InvoiceStats {
    let mut stats = InvoiceStats {
        currency,
        ..Default::default()
    };
    for invoice in invoices {
        match invoice.status {
            InvoiceStatus::Draft => stats.draft_count += 1,
            InvoiceStatus::Sent if invoice.currency == currency => {
                stats.outstanding = stats.outstanding.saturating_add(invoice.amount);
            }
            InvoiceStatus::Paid if invoice.currency == currency => {
                stats.paid = stats.paid.saturating_add(invoice.amount);
            }
            _ => {}
        }
        if invoice.is_overdue(now) {
            stats.overdue_count += 1;
        }
    }
    stats
}

#[utoipa::path(
    post,
    path = "/invoices",
    tag = "invoices",
    summary = "Create an invoice",
    description = "The amount is the sum of quantity × unit price over the line items. Invoices start as drafts.",
    request_body = InvoiceCreate,
    responses(
        (status = 201, description = "Invoice created", body = InvoiceResponse),
        (status = 400, description = "Invalid line items, dates or project"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Client not found"),
        (status = 409, description = "Invoice number already used"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_invoice(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Json(body): Json<InvoiceCreate>,
) -> Result<(StatusCode, Json<InvoiceResponse>)> {
    let client = state
        .store
        .get_user(body.user_id)
        .await?
        .filter(|user| user.status == UserStatus::Active)
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: body.user_id.to_string(),
        })?;

    let mut currency = body.currency;
    if let Some(project_id) = body.project_id {
        let project = state.store.get_project(project_id).await?;
        match project {
            Some(project) if project.user_id == client.id => {
                currency = currency.or(Some(project.currency));
            }
            _ => {
                return Err(Error::BadRequest {
                    message: format!("Project {project_id} does not belong to this client"),
                });
            }
        }
    }

    let now = Utc::now();
    let issue_date = body.issue_date.unwrap_or(now);
    if body.due_date < issue_date {
        return Err(Error::BadRequest {
            message: "The due date cannot be before the issue date".to_string(),
        });
    }

    let (items, amount) = price_items(&body.items)?;
    let invoice_number = body
        .invoice_number
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| generate_invoice_number(now));

    let invoice = state
        .store
        .create_invoice(&InvoiceCreateDBRequest {
            invoice_number,
            user_id: client.id,
            user_name: client.name().to_string(),
            user_email: client.email.clone(),
            project_id: body.project_id,
            amount,
            currency: currency.unwrap_or_else(|| state.config.default_currency()),
            issue_date,
            due_date: body.due_date,
            items,
        })
        .await?;

    info!("Invoice {} created for {} by {}", invoice.invoice_number, client.id, admin.id);
    Ok((StatusCode::CREATED, Json(InvoiceResponse::from_db(invoice, now))))
}

#[utoipa::path(
    get,
    path = "/invoices",
    tag = "invoices",
    summary = "List invoices",
    description = "Admins see every invoice, clients their own. `status=overdue` selects sent invoices past due.",
    params(ListQuery),
    responses(
        (status = 200, description = "Filtered, sorted invoices", body = Vec<InvoiceResponse>),
        (status = 400, description = "Unknown sort field"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_invoices(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InvoiceResponse>>> {
    let rows = state.store.list_invoices(&owner_filter(&current_user)).await?;
    let rows = views::apply(rows, &query)?;
    let now = Utc::now();
    Ok(Json(rows.into_iter().map(|row| InvoiceResponse::from_db(row, now)).collect()))
}

#[utoipa::path(
    get,
    path = "/invoices/export",
    tag = "invoices",
    summary = "Export invoices as CSV",
    description = "Exports exactly the rows the same list query returns.",
    params(ListQuery),
    responses(
        (status = 200, description = "CSV document", content_type = "text/csv"),
        (status = 400, description = "Unknown sort field"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn export_invoices(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<CsvExport> {
    let rows = state.store.list_invoices(&owner_filter(&current_user)).await?;
    let rows = views::apply(rows, &query)?;
    CsvExport::new(&rows, Utc::now().date_naive())
}

#[utoipa::path(
    get,
    path = "/invoices/stats",
    tag = "invoices",
    summary = "Invoice statistics",
    description = "Outstanding and paid totals in the reporting currency, with overdue and draft counts.",
    responses(
        (status = 200, description = "Statistics", body = InvoiceStats),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn invoice_statistics(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<InvoiceStats>> {
    let rows = state.store.list_invoices(&owner_filter(&current_user)).await?;
    Ok(Json(invoice_stats(&rows, state.config.default_currency(), Utc::now())))
}

#[utoipa::path(
    get,
    path = "/invoices/{id}",
    tag = "invoices",
    summary = "Get an invoice",
    params(("id" = uuid::Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice details", body = InvoiceResponse),
        (status = 403, description = "Not the billed client"),
        (status = 404, description = "Invoice not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<InvoiceId>,
) -> Result<Json<InvoiceResponse>> {
    let invoice = load_invoice(&state, id).await?;
    if !current_user.can_access(invoice.user_id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Read,
            resource: format!("invoice {id}"),
        });
    }
    Ok(Json(InvoiceResponse::from_db(invoice, Utc::now())))
}

async fn transition(state: &AppState, id: InvoiceId, action: InvoiceAction) -> Result<InvoiceDBResponse> {
    let invoice = load_invoice(state, id).await?;
    let next = invoice.status.apply(action)?;
    let update = InvoiceUpdateDBRequest {
        expected_status: invoice.status,
        status: next,
        paid_date: (next == InvoiceStatus::Paid).then(Utc::now),
    };
    let updated = state.store.update_invoice(id, &update).await?;
    info!("Invoice {} moved from {} to {}", updated.invoice_number, invoice.status, next);
    Ok(updated)
}

#[utoipa::path(
    post,
    path = "/invoices/{id}/send",
    tag = "invoices",
    summary = "Send a draft invoice",
    params(("id" = uuid::Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice sent", body = InvoiceResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Invoice not found"),
        (status = 409, description = "Invoice is not a draft"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_invoice(
    State(state): State<AppState>,
    RequiresAdmin(_admin): RequiresAdmin,
    Path(id): Path<InvoiceId>,
) -> Result<Json<InvoiceResponse>> {
    let updated = transition(&state, id, InvoiceAction::Send).await?;
    Ok(Json(InvoiceResponse::from_db(updated, Utc::now())))
}

#[utoipa::path(
    post,
    path = "/invoices/{id}/mark-paid",
    tag = "invoices",
    summary = "Mark a sent invoice as paid",
    params(("id" = uuid::Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice paid", body = InvoiceResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Invoice not found"),
        (status = 409, description = "Invoice has not been sent"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    RequiresAdmin(_admin): RequiresAdmin,
    Path(id): Path<InvoiceId>,
) -> Result<Json<InvoiceResponse>> {
    let updated = transition(&state, id, InvoiceAction::MarkPaid).await?;
    Ok(Json(InvoiceResponse::from_db(updated, Utc::now())))
}
