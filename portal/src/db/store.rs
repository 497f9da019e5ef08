use async_trait::async_trait;

use super::{
    errors::Result,
    models::{
        invoices::{InvoiceCreateDBRequest, InvoiceDBResponse, InvoiceUpdateDBRequest},
        payments::{PaymentCreateDBRequest, PaymentDBResponse, PaymentUpdateDBRequest},
        projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectUpdateDBRequest},
        requests::{RequestCreateDBRequest, RequestDBResponse, RequestUpdateDBRequest},
        transfers::{TransferDBResponse, TransferUpsertDBRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use crate::{
    lifecycle::{project::ProjectStatus, request::RequestStatus},
    types::{InvoiceId, PaymentId, ProjectId, RequestId, UserId},
};

/// Restricts a listing to one owner. `user_id: None` lists everything (admin views).
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerFilter {
    pub user_id: Option<UserId>,
}

impl OwnerFilter {
    pub fn all() -> Self {
        Self { user_id: None }
    }

    pub fn owned_by(user_id: UserId) -> Self {
        Self { user_id: Some(user_id) }
    }

    pub fn matches(&self, owner: UserId) -> bool {
        self.user_id.is_none_or(|id| id == owner)
    }
}

/// Record store used by every component of the portal.
///
/// Listings are returned newest first; presentation ordering is applied by the list views.
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>>;
    /// Case-insensitive lookup
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>>;
    async fn list_users(&self) -> Result<Vec<UserDBResponse>>;
    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse>;

    // Requests
    async fn create_request(&self, request: &RequestCreateDBRequest) -> Result<RequestDBResponse>;
    async fn get_request(&self, id: RequestId) -> Result<Option<RequestDBResponse>>;
    async fn list_requests(&self, filter: &OwnerFilter) -> Result<Vec<RequestDBResponse>>;
    async fn update_request(&self, id: RequestId, request: &RequestUpdateDBRequest) -> Result<RequestDBResponse>;
    /// Delete only if the request is still in `expected_status`
    async fn delete_request(&self, id: RequestId, expected_status: RequestStatus) -> Result<()>;
    /// Apply the approval update and create the project in one atomic step
    async fn approve_request(
        &self,
        id: RequestId,
        approval: &RequestUpdateDBRequest,
        project: &ProjectCreateDBRequest,
    ) -> Result<(RequestDBResponse, ProjectDBResponse)>;

    // Projects
    async fn get_project(&self, id: ProjectId) -> Result<Option<ProjectDBResponse>>;
    async fn list_projects(&self, filter: &OwnerFilter) -> Result<Vec<ProjectDBResponse>>;
    async fn update_project(&self, id: ProjectId, request: &ProjectUpdateDBRequest) -> Result<ProjectDBResponse>;
    /// Delete only if the project is still in `expected_status` with no payment activity
    async fn delete_project(&self, id: ProjectId, expected_status: ProjectStatus) -> Result<()>;
    /// Record a settled checkout: update the project and insert its payment atomically
    async fn complete_checkout(
        &self,
        id: ProjectId,
        update: &ProjectUpdateDBRequest,
        payment: Option<&PaymentCreateDBRequest>,
    ) -> Result<ProjectDBResponse>;

    // Invoices
    async fn create_invoice(&self, request: &InvoiceCreateDBRequest) -> Result<InvoiceDBResponse>;
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<InvoiceDBResponse>>;
    async fn list_invoices(&self, filter: &OwnerFilter) -> Result<Vec<InvoiceDBResponse>>;
    async fn update_invoice(&self, id: InvoiceId, request: &InvoiceUpdateDBRequest) -> Result<InvoiceDBResponse>;

    // Payments
    async fn create_payment(&self, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse>;
    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentDBResponse>>;
    async fn list_payments(&self, filter: &OwnerFilter) -> Result<Vec<PaymentDBResponse>>;
    async fn update_payment(&self, id: PaymentId, request: &PaymentUpdateDBRequest) -> Result<PaymentDBResponse>;

    // Transfers
    async fn upsert_transfer(&self, request: &TransferUpsertDBRequest) -> Result<TransferDBResponse>;
    async fn list_transfers(&self) -> Result<Vec<TransferDBResponse>>;

    // Gateway events
    /// Record that processing of `event_id` has started. Returns `false` if it was already
    /// claimed, in which case the caller must not process it again.
    async fn claim_event(&self, event_id: &str, event_type: &str) -> Result<bool>;
    /// Forget a claim so a redelivery of the event is processed again
    async fn release_event(&self, event_id: &str) -> Result<()>;
}
