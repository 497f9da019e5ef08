//! Test utilities shared by unit and HTTP-level tests.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    config::{
        AuthConfig, Config, DatabaseConfig, DummyConfig, PaymentConfig, PaymentProviderConfig, PayoutConfig, ProxyHeaderAuthConfig,
        SessionAuthConfig,
    },
    db::{
        MemoryStore, Store,
        models::{
            projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectUpdateDBRequest},
            requests::{RequestCreateDBRequest, RequestDBResponse, RequestUpdateDBRequest},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    lifecycle::{
        project::{PaymentStatus, ProjectStatus},
        request::RequestStatus,
    },
    money::{Currency, Money},
    payment_providers::{PaymentProvider, dummy::DummyProvider},
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_SESSION_SECRET: &str = "test-session-secret-for-testing-only";
pub const PRIMARY_ACCOUNT: &str = "acct_primary";
pub const SECONDARY_ACCOUNT: &str = "acct_secondary";

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig::Memory,
        admin_emails: vec!["owner@agency.test".to_string()],
        auth: AuthConfig {
            session: SessionAuthConfig {
                enabled: true,
                secret: Some(TEST_SESSION_SECRET.to_string()),
                ..Default::default()
            },
            proxy_header: ProxyHeaderAuthConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        payment: Some(PaymentConfig {
            provider: PaymentProviderConfig::Dummy(DummyConfig::default()),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
            webhook_tolerance: std::time::Duration::from_secs(300),
            currency: Currency::Gbp,
            payouts: PayoutConfig {
                primary_account: PRIMARY_ACCOUNT.to_string(),
                secondary_account: SECONDARY_ACCOUNT.to_string(),
            },
        }),
        enable_metrics: false,
        ..Default::default()
    }
}

/// Handles a test needs to reach behind the HTTP surface
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<DummyProvider>,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_config(create_test_config()).await
}

pub async fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(DummyProvider::default());
    let app = crate::Application::with_components(config, store.clone(), Some(gateway.clone() as Arc<dyn PaymentProvider>), None)
        .await
        .expect("Failed to create application");
    TestApp {
        server: app.into_test_server(),
        store,
        gateway,
    }
}

pub async fn create_test_user(store: &dyn Store, is_admin: bool) -> UserDBResponse {
    let id = Uuid::new_v4().simple().to_string();
    store
        .create_user(&UserCreateDBRequest {
            email: format!("user_{id}@example.com"),
            display_name: Some(format!("Test User {}", &id[..8])),
            photo_url: None,
            is_admin,
        })
        .await
        .expect("Failed to create test user")
}

pub fn add_auth_headers(user: &UserDBResponse) -> Vec<(String, String)> {
    let config = ProxyHeaderAuthConfig::default();
    vec![(config.email_header_name, user.email.clone())]
}

pub async fn create_test_request(store: &dyn Store, owner: &UserDBResponse) -> RequestDBResponse {
    store
        .create_request(&RequestCreateDBRequest {
            user_id: owner.id,
            user_email: owner.email.clone(),
            user_name: owner.name().to_string(),
            website_type: "Portfolio".to_string(),
            features: vec!["Contact form".to_string()],
            deadline: NaiveDate::from_ymd_opt(2030, 1, 31).expect("valid date"),
            budget: "£150".to_string(),
            design_preferences: None,
            additional_notes: None,
            currency: Currency::Gbp,
        })
        .await
        .expect("Failed to create test request")
}

/// A project approved from a fresh request, still awaiting its initial payment
pub async fn create_test_project(store: &dyn Store, owner: &UserDBResponse, budget_minor: i64) -> ProjectDBResponse {
    let request = create_test_request(store, owner).await;
    let budget = Money::new(budget_minor, Currency::Gbp);
    let approval = RequestUpdateDBRequest::approve(RequestStatus::Pending, RequestStatus::Approved, budget, owner.id, Utc::now());
    let (_, project) = store
        .approve_request(request.id, &approval, &ProjectCreateDBRequest::from_request(&request, budget))
        .await
        .expect("Failed to approve test request");
    project
}

/// Force a project into a given state, bypassing the lifecycle
pub async fn set_project_state(
    store: &dyn Store,
    project: &ProjectDBResponse,
    status: ProjectStatus,
    payment_status: PaymentStatus,
    client_approved: bool,
) -> ProjectDBResponse {
    store
        .update_project(
            project.id,
            &ProjectUpdateDBRequest {
                status: Some(status),
                payment_status: Some(payment_status),
                client_approved: Some(client_approved),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update test project")
}
