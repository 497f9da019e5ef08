use crate::{
    AppState,
    api::{
        handlers::owner_filter,
        models::{
            requests::{RequestApproval, RequestApprove, RequestCreate, RequestResponse, RequestTriage},
            users::CurrentUser,
        },
    },
    auth::RequiresAdmin,
    db::models::{
        projects::ProjectCreateDBRequest,
        requests::{RequestCreateDBRequest, RequestDBResponse, RequestUpdateDBRequest},
    },
    errors::{Error, Result},
    lifecycle::request::{RequestAction, RequestStatus},
    money::Money,
    types::{Operation, RequestId, UserId},
    views::{self, ListQuery},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;

async fn load_request(state: &AppState, id: RequestId) -> Result<RequestDBResponse> {
    state.store.get_request(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Request".to_string(),
        id: id.to_string(),
    })
}

fn required_reason(body: &RequestTriage) -> Result<String> {
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(Error::BadRequest {
            message: "A reason is required".to_string(),
        });
    }
    Ok(reason.to_string())
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "requests",
    summary = "Submit a project request",
    request_body = RequestCreate,
    responses(
        (status = 201, description = "Request submitted", body = RequestResponse),
        (status = 400, description = "Missing website type or budget"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<RequestCreate>,
) -> Result<(StatusCode, Json<RequestResponse>)> {
    let website_type = body.resolved_website_type().ok_or_else(|| Error::BadRequest {
        message: "A website type is required".to_string(),
    })?;
    if body.budget.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "A budget is required".to_string(),
        });
    }

    let request = state
        .store
        .create_request(&RequestCreateDBRequest {
            user_id: current_user.id,
            user_email: current_user.email.clone(),
            user_name: current_user.name().to_string(),
            website_type,
            features: body.features,
            deadline: body.deadline,
            budget: body.budget.trim().to_string(),
            design_preferences: body.design_preferences,
            additional_notes: body.additional_notes,
            currency: state.config.default_currency(),
        })
        .await?;

    info!("Request {} submitted by {}", request.id, current_user.id);
    Ok((StatusCode::CREATED, Json(request.into())))
}

#[utoipa::path(
    get,
    path = "/requests",
    tag = "requests",
    summary = "List requests",
    description = "Admins see every request, clients their own.",
    params(ListQuery),
    responses(
        (status = 200, description = "Filtered, sorted requests", body = Vec<RequestResponse>),
        (status = 400, description = "Unknown sort field"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_requests(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RequestResponse>>> {
    let rows = state.store.list_requests(&owner_filter(&current_user)).await?;
    let rows = views::apply(rows, &query)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    tag = "requests",
    summary = "Get a request",
    params(("id" = uuid::Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request details", body = RequestResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Request not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<RequestId>,
) -> Result<Json<RequestResponse>> {
    let request = load_request(&state, id).await?;
    if !current_user.can_access(request.user_id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Read,
            resource: format!("request {id}"),
        });
    }
    Ok(Json(request.into()))
}

#[utoipa::path(
    delete,
    path = "/requests/{id}",
    tag = "requests",
    summary = "Withdraw a pending request",
    params(("id" = uuid::Uuid, Path, description = "Request ID")),
    responses(
        (status = 204, description = "Request deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request has already been triaged"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<RequestId>,
) -> Result<StatusCode> {
    let request = load_request(&state, id).await?;
    if !current_user.can_access(request.user_id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Delete,
            resource: format!("request {id}"),
        });
    }
    request.status.ensure_deletable()?;
    state.store.delete_request(id, RequestStatus::Pending).await?;
    info!("Request {} withdrawn", id);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/requests/{id}/approve",
    tag = "requests",
    summary = "Approve a request",
    description = "Records the quoted budget and creates the project in one step.",
    request_body = RequestApprove,
    params(("id" = uuid::Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request approved and project created", body = RequestApproval),
        (status = 400, description = "Quoted budget is not a valid amount, or too small to charge in two installments"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending or on hold"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn approve_request(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(id): Path<RequestId>,
    Json(body): Json<RequestApprove>,
) -> Result<Json<RequestApproval>> {
    let request = load_request(&state, id).await?;
    let next = request.status.apply(RequestAction::Approve)?;

    let quoted = Money::parse_display(&body.quoted_budget, state.config.default_currency())?;
    // Both installments must be chargeable; the first is the smaller half
    let minimum = quoted.currency.minimum_charge();
    if quoted.split_evenly().0.amount_minor < minimum {
        return Err(Error::BadRequest {
            message: format!(
                "The quoted budget must be at least {} so each installment can be charged",
                Money::new(minimum * 2, quoted.currency)
            ),
        });
    }

    let approval = RequestUpdateDBRequest::approve(request.status, next, quoted, admin.id, Utc::now());
    let project = ProjectCreateDBRequest::from_request(&request, quoted);
    let (request, project) = state.store.approve_request(id, &approval, &project).await?;

    info!("Request {} approved at {} as project {}", id, quoted, project.id);
    Ok(Json(RequestApproval {
        request: request.into(),
        project: project.into(),
    }))
}

async fn triage(
    state: &AppState,
    admin: UserId,
    id: RequestId,
    action: RequestAction,
    reason: String,
) -> Result<RequestDBResponse> {
    let request = load_request(state, id).await?;
    let next = request.status.apply(action)?;
    let update = match action {
        RequestAction::Reject => RequestUpdateDBRequest::reject(request.status, next, reason, admin, Utc::now()),
        RequestAction::Hold => RequestUpdateDBRequest::hold(request.status, next, reason, admin, Utc::now()),
        RequestAction::Approve => {
            return Err(Error::Internal {
                operation: "approve a request without a quote".to_string(),
            });
        }
    };
    let updated = state.store.update_request(id, &update).await?;
    info!("Request {} moved from {} to {}", id, request.status, updated.status);
    Ok(updated)
}

#[utoipa::path(
    post,
    path = "/requests/{id}/reject",
    tag = "requests",
    summary = "Reject a request",
    request_body = RequestTriage,
    params(("id" = uuid::Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request rejected", body = RequestResponse),
        (status = 400, description = "Missing reason"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending or on hold"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn reject_request(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(id): Path<RequestId>,
    Json(body): Json<RequestTriage>,
) -> Result<Json<RequestResponse>> {
    let reason = required_reason(&body)?;
    let updated = triage(&state, admin.id, id, RequestAction::Reject, reason).await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/hold",
    tag = "requests",
    summary = "Put a request on hold",
    request_body = RequestTriage,
    params(("id" = uuid::Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request on hold", body = RequestResponse),
        (status = 400, description = "Missing reason"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn hold_request(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(id): Path<RequestId>,
    Json(body): Json<RequestTriage>,
) -> Result<Json<RequestResponse>> {
    let reason = required_reason(&body)?;
    let updated = triage(&state, admin.id, id, RequestAction::Hold, reason).await?;
    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::requests::{RequestApproval, RequestResponse},
        db::Store,
        lifecycle::{
            project::{PaymentStatus, ProjectStatus},
            request::RequestStatus,
        },
        test_utils::*,
    };
    use axum::http::StatusCode;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn test_client_submits_and_lists_own_requests() {
        let app = create_test_app().await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let other = create_test_user(app.store.as_ref(), false).await;
        create_test_request(app.store.as_ref(), &other).await;
        let (name, value) = &add_auth_headers(&client)[0];

        let response = app
            .server
            .post("/api/requests")
            .add_header(name, value)
            .json(&json!({
                "websiteType": "Other",
                "otherWebsiteType": "Charity shop",
                "features": ["Donations"],
                "deadline": "2030-06-01",
                "budget": "£250-£400"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: RequestResponse = response.json();
        assert_eq!(created.website_type, "Charity shop");
        assert_eq!(created.status, RequestStatus::Pending);
        assert_eq!(created.user_email, client.email);

        let listed: Vec<RequestResponse> = app.server.get("/api/requests").add_header(name, value).await.json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[test_log::test(tokio::test)]
    async fn test_other_website_type_requires_value() {
        let app = create_test_app().await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let (name, value) = &add_auth_headers(&client)[0];

        app.server
            .post("/api/requests")
            .add_header(name, value)
            .json(&json!({"websiteType": "Other", "deadline": "2030-06-01", "budget": "£150"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_approve_creates_project() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let request = create_test_request(app.store.as_ref(), &client).await;
        let (name, value) = &add_auth_headers(&admin)[0];

        let response = app
            .server
            .post(&format!("/api/requests/{}/approve", request.id))
            .add_header(name, value)
            .json(&json!({"quotedBudget": "£150"}))
            .await;
        response.assert_status_ok();
        let approval: RequestApproval = response.json();

        assert_eq!(approval.request.status, RequestStatus::Approved);
        assert_eq!(approval.request.quoted_budget.as_deref(), Some("£150"));
        assert_eq!(approval.project.budget, "£150");
        assert_eq!(approval.project.budget_amount, 15000);
        assert_eq!(approval.project.status, ProjectStatus::AwaitingPayment);
        assert_eq!(approval.project.payment_status, PaymentStatus::Pending);
        assert!(!approval.project.client_approved);
        assert_eq!(approval.project.website_type, "Portfolio");

        let projects = app.store.list_projects(&crate::db::OwnerFilter::all()).await.unwrap();
        assert_eq!(projects.len(), 1);

        // A second approval is refused and creates nothing
        app.server
            .post(&format!("/api/requests/{}/approve", request.id))
            .add_header(name, value)
            .json(&json!({"quotedBudget": "£150"}))
            .await
            .assert_status(StatusCode::CONFLICT);
        assert_eq!(app.store.list_projects(&crate::db::OwnerFilter::all()).await.unwrap().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_approve_rejects_unparseable_quote() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let request = create_test_request(app.store.as_ref(), &client).await;
        let (name, value) = &add_auth_headers(&admin)[0];

        for quote in ["£150-£200", "about 150", "150.505"] {
            app.server
                .post(&format!("/api/requests/{}/approve", request.id))
                .add_header(name, value)
                .json(&json!({ "quotedBudget": quote }))
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
        let stored = app.store.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[test_log::test(tokio::test)]
    async fn test_approve_rejects_quotes_too_small_to_charge() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let request = create_test_request(app.store.as_ref(), &client).await;
        let (name, value) = &add_auth_headers(&admin)[0];

        for quote in ["£0.01", "£0", "£0.59"] {
            let response = app
                .server
                .post(&format!("/api/requests/{}/approve", request.id))
                .add_header(name, value)
                .json(&json!({ "quotedBudget": quote }))
                .await;
            response.assert_status(StatusCode::BAD_REQUEST);
            let body: serde_json::Value = response.json();
            assert!(body["message"].as_str().unwrap().contains("£0.60"), "{quote}: {body}");
        }
        assert_eq!(app.store.get_request(request.id).await.unwrap().unwrap().status, RequestStatus::Pending);

        let approval: RequestApproval = app
            .server
            .post(&format!("/api/requests/{}/approve", request.id))
            .add_header(name, value)
            .json(&json!({"quotedBudget": "£0.60"}))
            .await
            .json();
        assert_eq!(approval.project.budget, "£0.60");
    }

    #[test_log::test(tokio::test)]
    async fn test_clients_cannot_triage() {
        let app = create_test_app().await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let request = create_test_request(app.store.as_ref(), &client).await;
        let (name, value) = &add_auth_headers(&client)[0];

        app.server
            .post(&format!("/api/requests/{}/approve", request.id))
            .add_header(name, value)
            .json(&json!({"quotedBudget": "£150"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[test_log::test(tokio::test)]
    async fn test_hold_then_reject() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let request = create_test_request(app.store.as_ref(), &client).await;
        let (name, value) = &add_auth_headers(&admin)[0];

        let held: RequestResponse = app
            .server
            .post(&format!("/api/requests/{}/hold", request.id))
            .add_header(name, value)
            .json(&json!({"reason": "Waiting for content"}))
            .await
            .json();
        assert_eq!(held.status, RequestStatus::OnHold);
        assert_eq!(held.hold_reason.as_deref(), Some("Waiting for content"));

        // Holding twice is not a transition
        app.server
            .post(&format!("/api/requests/{}/hold", request.id))
            .add_header(name, value)
            .json(&json!({"reason": "Again"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let rejected: RequestResponse = app
            .server
            .post(&format!("/api/requests/{}/reject", request.id))
            .add_header(name, value)
            .json(&json!({"reason": "Out of scope"}))
            .await
            .json();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Out of scope"));
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_only_while_pending() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let stranger = create_test_user(app.store.as_ref(), false).await;
        let pending = create_test_request(app.store.as_ref(), &client).await;
        let held = create_test_request(app.store.as_ref(), &client).await;
        let (client_name, client_value) = &add_auth_headers(&client)[0];
        let (admin_name, admin_value) = &add_auth_headers(&admin)[0];
        let (stranger_name, stranger_value) = &add_auth_headers(&stranger)[0];

        app.server
            .post(&format!("/api/requests/{}/hold", held.id))
            .add_header(admin_name, admin_value)
            .json(&json!({"reason": "Questions"}))
            .await
            .assert_status_ok();

        app.server
            .delete(&format!("/api/requests/{}", pending.id))
            .add_header(stranger_name, stranger_value)
            .await
            .assert_status(StatusCode::FORBIDDEN);
        app.server
            .delete(&format!("/api/requests/{}", held.id))
            .add_header(client_name, client_value)
            .await
            .assert_status(StatusCode::CONFLICT);
        app.server
            .delete(&format!("/api/requests/{}", pending.id))
            .add_header(client_name, client_value)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert!(app.store.get_request(pending.id).await.unwrap().is_none());
        assert!(app.store.get_request(held.id).await.unwrap().is_some());
    }
}
