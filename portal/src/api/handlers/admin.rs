use crate::{
    AppState,
    api::{
        handlers::invoices::invoice_stats,
        models::{admin::AdminOverview, projects::ProjectResponse},
    },
    auth::RequiresAdmin,
    db::{OwnerFilter, models::users::UserStatus},
    errors::Result,
    money::Money,
};
use axum::{Json, extract::State};
use chrono::Utc;

const RECENT_PROJECTS: usize = 5;

#[utoipa::path(
    get,
    path = "/admin/overview",
    tag = "admin",
    summary = "Dashboard overview",
    description = "Counts of active users, projects and invoices, revenue from paid invoices in the reporting \
                   currency and the most recently created projects.",
    responses(
        (status = 200, description = "Overview", body = AdminOverview),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn overview(State(state): State<AppState>, RequiresAdmin(_admin): RequiresAdmin) -> Result<Json<AdminOverview>> {
    let currency = state.config.default_currency();
    let users = state.store.list_users().await?;
    let projects = state.store.list_projects(&OwnerFilter::all()).await?;
    let invoices = state.store.list_invoices(&OwnerFilter::all()).await?;

    let revenue = invoice_stats(&invoices, currency, Utc::now()).paid;

    Ok(Json(AdminOverview {
        total_users: users.iter().filter(|u| u.status == UserStatus::Active).count(),
        total_projects: projects.len(),
        total_invoices: invoices.len(),
        revenue,
        currency,
        formatted_revenue: Money::new(revenue, currency).to_string(),
        recent_projects: projects.into_iter().take(RECENT_PROJECTS).map(ProjectResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use axum::http::StatusCode;

    #[test_log::test(tokio::test)]
    async fn test_overview_counts_and_recent_projects() {
        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let mut created = Vec::new();
        for i in 0..6 {
            created.push(create_test_project(app.store.as_ref(), &client, 10000 + i).await);
        }

        let (name, value) = &add_auth_headers(&client)[0];
        app.server
            .get("/api/admin/overview")
            .add_header(name, value)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let (name, value) = &add_auth_headers(&admin)[0];
        let overview: AdminOverview = app.server.get("/api/admin/overview").add_header(name, value).await.json();
        assert_eq!(overview.total_users, 2);
        assert_eq!(overview.total_projects, 6);
        assert_eq!(overview.total_invoices, 0);
        assert_eq!(overview.revenue, 0);
        assert_eq!(overview.formatted_revenue, "£0");
        assert_eq!(overview.recent_projects.len(), 5);
        assert!(overview.recent_projects.iter().all(|p| p.id != created[0].id));
    }

    #[test_log::test(tokio::test)]
    async fn test_revenue_saturates_on_huge_invoices() {
        use crate::{
            db::{
                Store,
                models::invoices::{InvoiceCreateDBRequest, InvoiceUpdateDBRequest},
            },
            lifecycle::invoice::InvoiceStatus,
            money::Currency,
        };
        use chrono::Duration;

        let app = create_test_app().await;
        let admin = create_test_user(app.store.as_ref(), true).await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let now = Utc::now();
        for n in 0..2 {
            let invoice = app
                .store
                .create_invoice(&InvoiceCreateDBRequest {
                    invoice_number: format!("INV-BIG-{n}"),
                    user_id: client.id,
                    user_name: "Big Spender".to_string(),
                    user_email: client.email.clone(),
                    project_id: None,
                    amount: i64::MAX / 2 + 1,
                    currency: Currency::Gbp,
                    issue_date: now,
                    due_date: now + Duration::days(30),
                    items: vec![],
                })
                .await
                .unwrap();
            for (from, to) in [(InvoiceStatus::Draft, InvoiceStatus::Sent), (InvoiceStatus::Sent, InvoiceStatus::Paid)] {
                app.store
                    .update_invoice(
                        invoice.id,
                        &InvoiceUpdateDBRequest {
                            expected_status: from,
                            status: to,
                            paid_date: (to == InvoiceStatus::Paid).then_some(now),
                        },
                    )
                    .await
                    .unwrap();
            }
        }

        let (name, value) = &add_auth_headers(&admin)[0];
        let overview: AdminOverview = app.server.get("/api/admin/overview").add_header(name, value).await.json();
        assert_eq!(overview.total_invoices, 2);
        assert_eq!(overview.revenue, i64::MAX);
    }
}
