//! OpenAPI documentation for the portal API at `/api/*`, served by Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, db, lifecycle, money};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token issued by the sign-in provider:\n\n\
                            ```\nAuthorization: Bearer YOUR_SESSION_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "portal_session",
                    "The same session token, carried in the session cookie set by the dashboard",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api", description = "Client portal API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::requests::create_request,
        api::handlers::requests::list_requests,
        api::handlers::requests::get_request,
        api::handlers::requests::delete_request,
        api::handlers::requests::approve_request,
        api::handlers::requests::reject_request,
        api::handlers::requests::hold_request,
        api::handlers::projects::list_projects,
        api::handlers::projects::get_project,
        api::handlers::projects::advance_project,
        api::handlers::projects::approve_project,
        api::handlers::projects::delete_project,
        api::handlers::projects::checkout_project,
        api::handlers::checkout::create_checkout_session,
        api::handlers::webhooks::webhook,
        api::handlers::invoices::create_invoice,
        api::handlers::invoices::list_invoices,
        api::handlers::invoices::export_invoices,
        api::handlers::invoices::invoice_statistics,
        api::handlers::invoices::get_invoice,
        api::handlers::invoices::send_invoice,
        api::handlers::invoices::mark_invoice_paid,
        api::handlers::payments::list_payments,
        api::handlers::payments::export_payments,
        api::handlers::payments::refund_payment,
        api::handlers::payments::list_transfers,
        api::handlers::users::list_users,
        api::handlers::users::export_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::set_role,
        api::handlers::users::delete_user,
        api::handlers::admin::overview,
        api::handlers::plans::suggest_plan,
    ),
    components(
        schemas(
            api::models::requests::RequestCreate,
            api::models::requests::RequestApprove,
            api::models::requests::RequestTriage,
            api::models::requests::RequestResponse,
            api::models::requests::RequestApproval,
            api::models::projects::ProjectResponse,
            api::models::projects::ProjectAdvance,
            api::models::projects::ClientApproval,
            api::models::checkout::CreateCheckoutSession,
            api::models::checkout::CheckoutSessionResponse,
            api::models::invoices::InvoiceItemCreate,
            api::models::invoices::InvoiceCreate,
            api::models::invoices::InvoiceResponse,
            api::models::invoices::InvoiceStats,
            api::models::payments::PaymentResponse,
            api::models::payments::TransferResponse,
            api::models::users::CurrentUser,
            api::models::users::UserResponse,
            api::models::users::ProfileUpdate,
            api::models::users::RoleUpdate,
            api::models::admin::AdminOverview,
            api::models::plans::SuggestPlanRequest,
            api::models::plans::SuggestPlanResponse,
            api::models::plans::SuggestPlanError,
            db::models::invoices::InvoiceItem,
            db::models::users::UserStatus,
            lifecycle::request::RequestStatus,
            lifecycle::project::ProjectStatus,
            lifecycle::project::PaymentStatus,
            lifecycle::invoice::InvoiceStatus,
            lifecycle::payment::PaymentType,
            lifecycle::payment::PaymentRecordStatus,
            lifecycle::payment::TransferStatus,
            money::Currency,
        )
    ),
    tags(
        (name = "requests", description = "Client project requests and admin triage"),
        (name = "projects", description = "Project tracking, sign-off and installments"),
        (name = "invoices", description = "Invoicing"),
        (name = "payments", description = "Checkout, gateway webhooks, payment records and payouts"),
        (name = "users", description = "Accounts, profiles and roles"),
        (name = "admin", description = "Back-office dashboard"),
        (name = "plans", description = "Pricing plan suggestions"),
    ),
    info(
        title = "Client Portal API",
        description = "Requests, projects, invoices and payments for the agency's clients and staff.",
    )
)]
pub struct ApiDoc;
