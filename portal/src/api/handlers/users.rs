use crate::{
    AppState,
    api::models::users::{CurrentUser, ProfileUpdate, RoleUpdate, UserResponse},
    auth::RequiresAdmin,
    db::models::users::{UserDBResponse, UserStatus, UserUpdateDBRequest},
    errors::{Error, Result},
    types::{Operation, UserId, UserIdOrCurrent},
    views::{self, ListQuery, csv::CsvExport},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;

async fn load_user(state: &AppState, id: UserId) -> Result<UserDBResponse> {
    state
        .store
        .get_user(id)
        .await?
        .filter(|user| user.status == UserStatus::Active)
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        })
}

/// Resolve `current` and refuse access to other users' profiles unless the caller is an admin
fn target_user(user_id: &UserIdOrCurrent, current_user: &CurrentUser, action: Operation) -> Result<UserId> {
    let id = user_id.resolve(current_user.id);
    if !current_user.can_access(id) {
        return Err(Error::InsufficientPermissions {
            action,
            resource: format!("user {id}"),
        });
    }
    Ok(id)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "Filter by `status` (`active`, `deleted`) and `role` (`admin`, `client`).",
    params(ListQuery),
    responses(
        (status = 200, description = "Filtered, sorted users", body = Vec<UserResponse>),
        (status = 400, description = "Unknown sort field"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    RequiresAdmin(_admin): RequiresAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<UserResponse>>> {
    let rows = views::apply(state.store.list_users().await?, &query)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/users/export",
    tag = "users",
    summary = "Export users as CSV",
    params(ListQuery),
    responses(
        (status = 200, description = "CSV document", content_type = "text/csv"),
        (status = 400, description = "Unknown sort field"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn export_users(
    State(state): State<AppState>,
    RequiresAdmin(_admin): RequiresAdmin,
    Query(query): Query<ListQuery>,
) -> Result<CsvExport> {
    let rows = views::apply(state.store.list_users().await?, &query)?;
    CsvExport::new(&rows, Utc::now().date_naive())
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get a user profile",
    params(("user_id" = String, Path, description = "User ID (UUID) or 'current' for the caller")),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 403, description = "Another user's profile"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserIdOrCurrent>,
) -> Result<Json<UserResponse>> {
    let id = target_user(&user_id, &current_user, Operation::Read)?;
    Ok(Json(load_user(&state, id).await?.into()))
}

#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update a user profile",
    description = "Absent fields are left unchanged. The email address and role cannot be changed here.",
    params(("user_id" = String, Path, description = "User ID (UUID) or 'current' for the caller")),
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 403, description = "Another user's profile"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserIdOrCurrent>,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<UserResponse>> {
    let id = target_user(&user_id, &current_user, Operation::Update)?;
    load_user(&state, id).await?;

    let update = UserUpdateDBRequest {
        display_name: trimmed(body.display_name),
        photo_url: trimmed(body.photo_url),
        phone: trimmed(body.phone),
        company: trimmed(body.company),
        bio: body.bio,
        ..Default::default()
    };
    let user = state.store.update_user(id, &update).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/users/{user_id}/role",
    tag = "users",
    summary = "Grant or revoke admin",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    request_body = RoleUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Admins cannot demote themselves"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn set_role(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(user_id): Path<UserId>,
    Json(body): Json<RoleUpdate>,
) -> Result<Json<UserResponse>> {
    if user_id == admin.id && !body.is_admin {
        return Err(Error::BadRequest {
            message: "You cannot remove your own admin role".to_string(),
        });
    }
    load_user(&state, user_id).await?;

    let user = state
        .store
        .update_user(
            user_id,
            &UserUpdateDBRequest {
                is_admin: Some(body.is_admin),
                ..Default::default()
            },
        )
        .await?;
    info!("User {} admin={} set by {}", user_id, body.is_admin, admin.id);
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Delete a user",
    description = "Marks the account deleted. Its records are kept and it can no longer sign in.",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Admins cannot delete themselves"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    RequiresAdmin(admin): RequiresAdmin,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode> {
    if user_id == admin.id {
        return Err(Error::BadRequest {
            message: "You cannot delete your own account".to_string(),
        });
    }
    load_user(&state, user_id).await?;

    state
        .store
        .update_user(
            user_id,
            &UserUpdateDBRequest {
                status: Some(UserStatus::Deleted),
                ..Default::default()
            },
        )
        .await?;
    info!("User {} deleted by {}", user_id, admin.id);
    Ok(StatusCode::NO_CONTENT)
}
