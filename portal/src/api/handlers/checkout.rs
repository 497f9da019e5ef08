use crate::{
    AppState,
    api::models::{
        checkout::{CheckoutSessionResponse, CreateCheckoutSession},
        users::CurrentUser,
    },
    checkout::{CheckoutInput, CheckoutService},
    errors::{Error, Result},
    types::ProjectId,
};
use axum::{Json, extract::State};

pub(crate) fn checkout_service(state: &AppState) -> Result<CheckoutService> {
    let gateway = state.gateway.clone().ok_or_else(|| Error::ServiceUnavailable {
        service: "Payment gateway".to_string(),
        message: "no payment provider is configured".to_string(),
    })?;
    Ok(CheckoutService::new(state.store.clone(), gateway, &state.config.app_url))
}

/// Reject bodies missing any of `projectId`, `amount` or `customerEmail`
fn validate(body: CreateCheckoutSession) -> Result<CheckoutInput> {
    let missing = || Error::BadRequest {
        message: "Missing required fields".to_string(),
    };
    let project_id = body.project_id.as_deref().map(str::trim).filter(|id| !id.is_empty()).ok_or_else(missing)?;
    let amount = body.amount.filter(|amount| *amount != 0).ok_or_else(missing)?;
    let customer_email = body
        .customer_email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .ok_or_else(missing)?;

    let project_id: ProjectId = project_id.parse().map_err(|_| Error::BadRequest {
        message: format!("Invalid projectId '{project_id}'"),
    })?;
    Ok(CheckoutInput {
        project_id,
        amount,
        customer_email,
        customer_name: body.customer_name,
    })
}

#[utoipa::path(
    post,
    path = "/create-checkout-session",
    tag = "payments",
    summary = "Create a checkout session",
    description = "Opens a hosted checkout for the installment due on a project. `amount` is in minor units \
                   and must equal that installment.",
    request_body = CreateCheckoutSession,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 400, description = "Missing fields or wrong amount"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "No payment is due"),
        (status = 503, description = "Payment gateway unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<CreateCheckoutSession>,
) -> Result<Json<CheckoutSessionResponse>> {
    let input = validate(body)?;
    let service = checkout_service(&state)?;
    let session = service.create_session(&current_user, &input).await?;
    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        url: session.url,
    }))
}
