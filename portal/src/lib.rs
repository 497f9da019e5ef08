//! # portal: client portal and back-office for a web development agency
//!
//! Clients submit project requests, pay for approved projects in two installments through a hosted
//! payment gateway and sign off on delivered work. Staff triage requests, move projects through
//! their stages, issue invoices and manage accounts.
//!
//! ## Architecture
//!
//! The service is an [Axum](https://github.com/tokio-rs/axum) application. Everything under
//! `/api` is described by the OpenAPI document in [`openapi`] and browsable at `/docs`.
//!
//! - **Identity** is delegated to a hosted sign-in provider; [`auth`] accepts its session tokens or
//!   headers from an authenticating proxy and maps them onto portal accounts.
//! - **State** lives behind the [`db::Store`] trait, backed by PostgreSQL in production and by an
//!   in-process store for development and tests.
//! - **Status changes** for requests, projects, invoices and payments go through the transition
//!   tables in [`lifecycle`] and are persisted with a compare-and-set on the state they were
//!   checked against.
//! - **Payments** use the gateway abstraction in [`payment_providers`]: [`checkout`] opens hosted
//!   checkouts for the installment due, and [`webhooks`] confirms them, splits settled funds
//!   between the two payout accounts and mirrors transfers. Webhook events are processed at most
//!   once per event id.
//! - **List views** share one search, filter and sort pipeline in [`views`], which the CSV exports
//!   reuse so a download always matches what is on screen.
//! - **Plan suggestions** ([`plans`]) proxy a single prompt to an OpenAI-compatible model.
//!
//! ## Configuration
//!
//! See [`config`]. Without a `payment` section the checkout and webhook endpoints answer 503;
//! without `plan_suggester` so does `/api/suggest-plan`.

pub mod api;
pub mod auth;
pub mod checkout;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod money;
pub mod openapi;
pub mod payment_providers;
pub mod plans;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;
pub mod views;
pub mod webhooks;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    config::{CorsOrigin, DatabaseConfig},
    db::{
        MemoryStore, PgStore, Store,
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    openapi::ApiDoc,
    payment_providers::PaymentProvider,
    plans::PlanSuggester,
};

/// Shared state handed to every handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .store(store)
///     .config(config)
///     .maybe_gateway(gateway)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    /// `None` when payments are not configured
    pub gateway: Option<Arc<dyn PaymentProvider>>,
    pub plan_suggester: Option<Arc<PlanSuggester>>,
}

/// Outbound HTTP client for the gateway and the language model
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    // Already installed when running under main
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    reqwest::Client::builder().timeout(timeout).build()
}

/// Make sure every address in `admin_emails` has an admin account.
///
/// Missing accounts are created; existing ones are promoted. Nobody is ever demoted here.
pub async fn bootstrap_admins(store: &dyn Store, config: &Config) -> anyhow::Result<()> {
    for email in &config.admin_emails {
        match store.get_user_by_email(email).await? {
            Some(user) if user.is_admin => {}
            Some(user) => {
                store
                    .update_user(
                        user.id,
                        &UserUpdateDBRequest {
                            is_admin: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!("Promoted {} to admin", email);
            }
            None => {
                store
                    .create_user(&UserCreateDBRequest {
                        email: email.clone(),
                        display_name: None,
                        photo_url: None,
                        is_admin: true,
                    })
                    .await?;
                info!("Created admin account for {}", email);
            }
        }
    }
    Ok(())
}

/// Open the configured store, running migrations for PostgreSQL
async fn setup_store(config: &Config) -> anyhow::Result<(Arc<dyn Store>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::Memory => {
            info!("Using the in-memory store; data will not survive a restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        DatabaseConfig::Postgres { url, pool } => {
            let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
            let pg = PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(Duration::from_secs(pool.acquire_timeout_secs))
                .idle_timeout(optional(pool.idle_timeout_secs))
                .max_lifetime(optional(pool.max_lifetime_secs))
                .connect(url)
                .await?;
            db::postgres::migrator().run(&pg).await?;
            Ok((Arc::new(PgStore::new(pg.clone())), Some(pg)))
        }
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers([http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the router: `/api` routes, docs at `/docs`, `/healthz`, and `/internal/metrics` when
/// metrics are enabled.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    use api::handlers::{admin, checkout, invoices, payments, plans, projects, requests, users, webhooks};

    let api_routes = Router::new()
        // Requests
        .route("/requests", get(requests::list_requests).post(requests::create_request))
        .route("/requests/{id}", get(requests::get_request).delete(requests::delete_request))
        .route("/requests/{id}/approve", post(requests::approve_request))
        .route("/requests/{id}/reject", post(requests::reject_request))
        .route("/requests/{id}/hold", post(requests::hold_request))
        // Projects
        .route("/projects", get(projects::list_projects))
        .route("/projects/{id}", get(projects::get_project).delete(projects::delete_project))
        .route("/projects/{id}/status", post(projects::advance_project))
        .route("/projects/{id}/approve", post(projects::approve_project))
        .route("/projects/{id}/checkout", post(projects::checkout_project))
        // Gateway
        .route("/create-checkout-session", post(checkout::create_checkout_session))
        .route("/webhook", post(webhooks::webhook))
        // Invoices
        .route("/invoices", get(invoices::list_invoices).post(invoices::create_invoice))
        .route("/invoices/export", get(invoices::export_invoices))
        .route("/invoices/stats", get(invoices::invoice_statistics))
        .route("/invoices/{id}", get(invoices::get_invoice))
        .route("/invoices/{id}/send", post(invoices::send_invoice))
        .route("/invoices/{id}/mark-paid", post(invoices::mark_invoice_paid))
        // Payments and payouts
        .route("/payments", get(payments::list_payments))
        .route("/payments/export", get(payments::export_payments))
        .route("/payments/{id}/refund", post(payments::refund_payment))
        .route("/transfers", get(payments::list_transfers))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/export", get(users::export_users))
        .route(
            "/users/{user_id}",
            get(users::get_user).patch(users::update_user).delete(users::delete_user),
        )
        .route("/users/{user_id}/role", axum::routing::patch(users::set_role))
        // Dashboard and plan suggestions
        .route("/admin/overview", get(admin::overview))
        .route("/suggest-plan", post(plans::suggest_plan))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Owns the router and the resources it depends on.
///
/// 1. [`Application::new`] opens the store, runs migrations, bootstraps admin accounts and
///    connects the configured gateway and language model
/// 2. [`Application::serve`] binds and serves until the shutdown future resolves, then closes
///    the database pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting portal with configuration: {:#?}", config);

        let (store, pool) = setup_store(&config).await?;
        bootstrap_admins(store.as_ref(), &config).await?;

        let gateway: Option<Arc<dyn PaymentProvider>> = match &config.payment {
            Some(payment) => Some(Arc::from(payment_providers::create_provider(&payment.provider)?)),
            None => {
                info!("No payment section configured; checkout and webhooks are disabled");
                None
            }
        };
        let plan_suggester = config.plan_suggester.as_ref().map(PlanSuggester::new).transpose()?.map(Arc::new);

        let mut app = Self::with_components(config, store, gateway, plan_suggester).await?;
        app.pool = pool;
        Ok(app)
    }

    /// Assemble the application around an already constructed store and collaborators
    pub async fn with_components(
        config: Config,
        store: Arc<dyn Store>,
        gateway: Option<Arc<dyn PaymentProvider>>,
        plan_suggester: Option<Arc<PlanSuggester>>,
    ) -> anyhow::Result<Self> {
        let state = AppState::builder()
            .store(store)
            .config(config.clone())
            .maybe_gateway(gateway)
            .maybe_plan_suggester(plan_suggester)
            .build();
        let router = build_router(state)?;
        Ok(Self { router, config, pool: None })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Portal listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();
        Ok(())
    }
}
