use crate::{
    AppState,
    api::{
        handlers::{checkout::checkout_service, owner_filter},
        models::{
            checkout::CheckoutSessionResponse,
            projects::{ClientApproval, ProjectAdvance, ProjectResponse},
            users::CurrentUser,
        },
    },
    auth::RequiresAdmin,
    checkout::CheckoutInput,
    db::models::projects::{ProjectDBResponse, ProjectUpdateDBRequest},
    errors::{Error, Result},
    lifecycle::project::ProjectStatus,
    types::{Operation, ProjectId},
    views::{self, ListQuery},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;

async fn load_project(state: &AppState, id: ProjectId) -> Result<ProjectDBResponse> {
    state.store.get_project(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Project".to_string(),
        id: id.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "projects",
    summary = "List projects",
    description = "Admins see every project, clients their own.",
    params(ListQuery),
    responses(
        (status = 200, description = "Filtered, sorted projects", body = Vec<ProjectResponse>),
        (status = 400, description = "Unknown sort field"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_projects(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProjectResponse>>> {
    let rows = state.store.list_projects(&owner_filter(&current_user)).await?;
    let rows = views::apply(rows, &query)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "projects",
    summary = "Get a project",
    params(("id" = uuid::Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project details", body = ProjectResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Project not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_project(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ProjectId>,
) -> Result<Json<ProjectResponse>> {
    let project = load_project(&state, id).await?;
    if !current_user.can_access(project.user_id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Read,
            resource: format!("project {id}"),
        });
    }
    Ok(Json(project.into()))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/status",
    tag = "projects",
    summary = "Move a project to its next stage",
    description = "The target must be the next stage, or `cancelled`. Leaving `awaiting payment` requires the \
                   initial payment; leaving `client review` requires client approval.",
    request_body = ProjectAdvance,
    params(("id" = uuid::Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project moved", body = ProjectResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Transition not allowed from the current stage"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn advance_project(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(id): Path<ProjectId>,
    Json(body): Json<ProjectAdvance>,
) -> Result<Json<ProjectResponse>> {
    let project = load_project(&state, id).await?;
    let next = project.snapshot().advance_to(body.status)?;

    let now = Utc::now();
    let update = ProjectUpdateDBRequest {
        expected_status: Some(project.status),
        status: Some(next),
        completed_at: (next == ProjectStatus::Completed).then_some(now),
        cancelled_at: (next == ProjectStatus::Cancelled).then_some(now),
        ..Default::default()
    };
    let updated = state.store.update_project(id, &update).await?;

    info!("Project {} moved from {} to {} by {}", id, project.status, next, admin.id);
    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/approve",
    tag = "projects",
    summary = "Approve the delivered work",
    description = "Client sign-off during review. The stage itself is left for the admin to advance.",
    request_body = ClientApproval,
    params(("id" = uuid::Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Work approved", body = ProjectResponse),
        (status = 403, description = "Not the project's client"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Project is not in client review"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn approve_project(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ProjectId>,
    Json(body): Json<ClientApproval>,
) -> Result<Json<ProjectResponse>> {
    let project = load_project(&state, id).await?;
    if project.user_id != current_user.id {
        return Err(Error::InsufficientPermissions {
            action: Operation::Update,
            resource: format!("project {id}"),
        });
    }
    project.snapshot().ensure_client_review()?;

    let update = ProjectUpdateDBRequest {
        expected_status: Some(ProjectStatus::ClientReview),
        client_approved: Some(true),
        client_feedback: body.feedback.map(|f| f.trim().to_string()).filter(|f| !f.is_empty()),
        approved_at: Some(Utc::now()),
        ..Default::default()
    };
    let updated = state.store.update_project(id, &update).await?;

    info!("Client approved project {}", id);
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "projects",
    summary = "Delete a project",
    description = "Only projects still awaiting payment with no checkout started can be deleted.",
    params(("id" = uuid::Uuid, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Payment activity exists"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_project(
    State(state): State<AppState>,
    RequiresAdmin(_admin): RequiresAdmin,
    Path(id): Path<ProjectId>,
) -> Result<StatusCode> {
    let project = load_project(&state, id).await?;
    project.snapshot().ensure_deletable()?;
    state.store.delete_project(id, project.status).await?;
    info!("Project {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/projects/{id}/checkout",
    tag = "projects",
    summary = "Pay the installment due",
    description = "Opens a hosted checkout for whichever installment is currently due, for its exact amount.",
    params(("id" = uuid::Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "No payment is due"),
        (status = 503, description = "Payment gateway unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn checkout_project(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ProjectId>,
) -> Result<Json<CheckoutSessionResponse>> {
    let service = checkout_service(&state)?;
    let project = load_project(&state, id).await?;
    if !current_user.can_access(project.user_id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Pay,
            resource: format!("project {id}"),
        });
    }
    let due = project.snapshot().payment_due()?.share_of(project.budget());

    let input = CheckoutInput {
        project_id: id,
        amount: due.amount_minor,
        customer_email: current_user.email.clone(),
        customer_name: Some(current_user.name().to_string()),
    };
    let session = service.create_session(&current_user, &input).await?;
    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{checkout::CheckoutSessionResponse, projects::ProjectResponse},
        db::Store,
        lifecycle::{
            payment::PaymentType,
            project::{PaymentStatus, ProjectStatus},
        },
        test_utils::*,
    };
    use axum::http::StatusCode;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn test_clients_only_see_their_projects() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let other = create_test_user(app.store.as_ref(), false).await;
        let mine = create_test_project(app.store.as_ref(), &client, 15000).await;
        let theirs = create_test_project(app.store.as_ref(), &other, 30000).await;
        let (name, value) = &add_auth_headers(&client)[0];

        let listed: Vec<ProjectResponse> = app.server.get("/api/projects").add_header(name, value).await.json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        app.server
            .get(&format!("/api/projects/{}", theirs.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let (admin_name, admin_value) = &add_auth_headers(&admin)[0];
        let all: Vec<ProjectResponse> = app
            .server
            .get("/api/projects?sort=budget&direction=desc")
            .add_header(admin_name, admin_value)
            .await
            .json();
        assert_eq!(all.iter().map(|p| p.budget_amount).collect::<Vec<_>>(), vec![30000, 15000]);
    }

    #[test_log::test(tokio::test)]
    async fn test_advance_requires_payment() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let unpaid = create_test_project(app.store.as_ref(), &client, 15000).await;
        let paid = create_test_project(app.store.as_ref(), &client, 15000).await;
        set_project_state(app.store.as_ref(), &paid, ProjectStatus::AwaitingPayment, PaymentStatus::Paid, false).await;
        let (name, value) = &add_auth_headers(&admin)[0];

        app.server
            .post(&format!("/api/projects/{}/status", unpaid.id))
            .add_header(name, value)
            .json(&json!({"status": "in progress"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let moved: ProjectResponse = app
            .server
            .post(&format!("/api/projects/{}/status", paid.id))
            .add_header(name, value)
            .json(&json!({"status": "in progress"}))
            .await
            .json();
        assert_eq!(moved.status, ProjectStatus::InProgress);

        // Skipping a stage is refused
        app.server
            .post(&format!("/api/projects/{}/status", paid.id))
            .add_header(name, value)
            .json(&json!({"status": "completed"}))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[test_log::test(tokio::test)]
    async fn test_client_review_flow() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let project = create_test_project(app.store.as_ref(), &client, 15000).await;
        set_project_state(app.store.as_ref(), &project, ProjectStatus::ClientReview, PaymentStatus::Paid, false).await;
        let (admin_name, admin_value) = &add_auth_headers(&admin)[0];
        let (client_name, client_value) = &add_auth_headers(&client)[0];

        // Final review needs the client's sign-off first
        app.server
            .post(&format!("/api/projects/{}/status", project.id))
            .add_header(admin_name, admin_value)
            .json(&json!({"status": "final review"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let approved: ProjectResponse = app
            .server
            .post(&format!("/api/projects/{}/approve", project.id))
            .add_header(client_name, client_value)
            .json(&json!({"feedback": "Looks great"}))
            .await
            .json();
        assert!(approved.client_approved);
        assert_eq!(approved.status, ProjectStatus::ClientReview);
        assert_eq!(approved.client_feedback.as_deref(), Some("Looks great"));

        let moved: ProjectResponse = app
            .server
            .post(&format!("/api/projects/{}/status", project.id))
            .add_header(admin_name, admin_value)
            .json(&json!({"status": "final review"}))
            .await
            .json();
        assert_eq!(moved.status, ProjectStatus::FinalReview);

        // Approval is only possible during client review
        app.server
            .post(&format!("/api/projects/{}/approve", project.id))
            .add_header(client_name, client_value)
            .json(&json!({}))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[test_log::test(tokio::test)]
    async fn test_cancel_and_delete() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let fresh = create_test_project(app.store.as_ref(), &client, 15000).await;
        let started = create_test_project(app.store.as_ref(), &client, 15000).await;
        set_project_state(app.store.as_ref(), &started, ProjectStatus::InProgress, PaymentStatus::Paid, false).await;
        let (name, value) = &add_auth_headers(&admin)[0];

        app.server
            .delete(&format!("/api/projects/{}", started.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::CONFLICT);

        let cancelled: ProjectResponse = app
            .server
            .post(&format!("/api/projects/{}/status", started.id))
            .add_header(name, value)
            .json(&json!({"status": "cancelled"}))
            .await
            .json();
        assert_eq!(cancelled.status, ProjectStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        app.server
            .delete(&format!("/api/projects/{}", fresh.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert!(app.store.get_project(fresh.id).await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_checkout_for_installment_due() {
        let app = create_test_app().await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let project = create_test_project(app.store.as_ref(), &client, 15001).await;
        let (name, value) = &add_auth_headers(&client)[0];

        let response: CheckoutSessionResponse = app
            .server
            .post(&format!("/api/projects/{}/checkout", project.id))
            .add_header(name, value)
            .await
            .json();
        assert!(response.session_id.starts_with("cs_dummy_"));
        assert!(response.url.is_some());

        let (_, request) = app.gateway.sessions().await.remove(0);
        assert_eq!(request.payment_type, PaymentType::Initial);
        assert_eq!(request.amount.amount_minor, 7500);
        assert_eq!(request.customer_email, client.email);
    }

    #[test_log::test(tokio::test)]
    async fn test_checkout_by_non_owner_is_forbidden_whatever_the_stage() {
        let app = create_test_app().await;
        let owner = create_test_user(app.store.as_ref(), false).await;
        let stranger = create_test_user(app.store.as_ref(), false).await;
        let project = create_test_project(app.store.as_ref(), &owner, 15000).await;
        set_project_state(app.store.as_ref(), &project, ProjectStatus::InProgress, PaymentStatus::Paid, false).await;

        let (name, value) = &add_auth_headers(&stranger)[0];
        let response = app
            .server
            .post(&format!("/api/projects/{}/checkout", project.id))
            .add_header(name, value)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert!(!response.text().contains("in progress"));
        assert!(app.gateway.sessions().await.is_empty());

        // The owner hits the stage check instead
        let (name, value) = &add_auth_headers(&owner)[0];
        app.server
            .post(&format!("/api/projects/{}/checkout", project.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}
