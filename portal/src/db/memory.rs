//! In-process [`Store`] implementation.
//!
//! All tables live behind one async mutex, so every operation (including the multi-record ones)
//! is atomic with respect to every other. Constraint behaviour mirrors the PostgreSQL schema:
//! unique keys, monotonic payment status and compare-and-set status updates.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    errors::{DbError, Result},
    models::{
        invoices::{InvoiceCreateDBRequest, InvoiceDBResponse, InvoiceUpdateDBRequest},
        payments::{PaymentCreateDBRequest, PaymentDBResponse, PaymentUpdateDBRequest},
        projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectUpdateDBRequest},
        requests::{RequestCreateDBRequest, RequestDBResponse, RequestUpdateDBRequest},
        transfers::{TransferDBResponse, TransferUpsertDBRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserStatus, UserUpdateDBRequest},
    },
    store::{OwnerFilter, Store},
};
use crate::{
    lifecycle::{
        project::{PaymentStatus, ProjectStatus},
        request::RequestStatus,
    },
    types::{InvoiceId, PaymentId, ProjectId, RequestId, UserId},
};

#[derive(Default)]
struct Tables {
    users: Vec<UserDBResponse>,
    requests: Vec<RequestDBResponse>,
    projects: Vec<ProjectDBResponse>,
    invoices: Vec<InvoiceDBResponse>,
    payments: Vec<PaymentDBResponse>,
    transfers: Vec<TransferDBResponse>,
    events: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique_violation(table: &str, constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some(table.to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

fn stale(entity: &'static str, id: Uuid) -> DbError {
    DbError::StaleState {
        entity,
        id: id.to_string(),
    }
}

/// Newest-first copy of the rows `keep` selects
fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|row| keep(row)).cloned().collect()
}

fn apply_request_update(row: &mut RequestDBResponse, update: &RequestUpdateDBRequest) -> Result<()> {
    if let Some(expected) = update.expected_status
        && row.status != expected
    {
        return Err(stale("request", row.id));
    }
    if let Some(status) = update.status {
        row.status = status;
    }
    if let Some(quoted) = update.quoted_budget {
        row.quoted_budget = Some(quoted);
    }
    if let Some(currency) = update.currency {
        row.currency = currency;
    }
    row.approved_at = update.approved_at.or(row.approved_at);
    row.approved_by = update.approved_by.or(row.approved_by);
    row.rejected_at = update.rejected_at.or(row.rejected_at);
    row.rejected_by = update.rejected_by.or(row.rejected_by);
    row.held_at = update.held_at.or(row.held_at);
    row.held_by = update.held_by.or(row.held_by);
    if let Some(reason) = &update.rejection_reason {
        row.rejection_reason = Some(reason.clone());
    }
    if let Some(reason) = &update.hold_reason {
        row.hold_reason = Some(reason.clone());
    }
    Ok(())
}

fn apply_project_update(row: &mut ProjectDBResponse, update: &ProjectUpdateDBRequest) -> Result<()> {
    if let Some(expected) = update.expected_status
        && row.status != expected
    {
        return Err(stale("project", row.id));
    }
    if let Some(status) = update.status {
        row.status = status;
    }
    if let Some(payment_status) = update.payment_status {
        row.payment_status = row.payment_status.advance_to(payment_status);
    }
    if let Some(approved) = update.client_approved {
        row.client_approved = approved;
    }
    if let Some(feedback) = &update.client_feedback {
        row.client_feedback = Some(feedback.clone());
    }
    if let Some(session_id) = &update.checkout_session_id {
        row.checkout_session_id = Some(session_id.clone());
    }
    if let Some(intent_id) = &update.payment_intent_id {
        row.payment_intent_id = Some(intent_id.clone());
    }
    row.payment_amount = update.payment_amount.or(row.payment_amount);
    row.paid_at = update.paid_at.or(row.paid_at);
    row.approved_at = update.approved_at.or(row.approved_at);
    row.completed_at = update.completed_at.or(row.completed_at);
    row.cancelled_at = update.cancelled_at.or(row.cancelled_at);
    Ok(())
}

fn insert_project(tables: &mut Tables, request: &ProjectCreateDBRequest) -> Result<ProjectDBResponse> {
    if tables.projects.iter().any(|p| p.request_id == request.request_id) {
        return Err(unique_violation("projects", "projects_request_id_key"));
    }
    let project = ProjectDBResponse {
        id: Uuid::new_v4(),
        request_id: request.request_id,
        user_id: request.user_id,
        user_email: request.user_email.clone(),
        user_name: request.user_name.clone(),
        website_type: request.website_type.clone(),
        features: request.features.clone(),
        budget: request.budget,
        currency: request.currency,
        deadline: request.deadline,
        design_preferences: request.design_preferences.clone(),
        additional_notes: request.additional_notes.clone(),
        status: ProjectStatus::AwaitingPayment,
        payment_status: PaymentStatus::Pending,
        client_approved: false,
        client_feedback: None,
        checkout_session_id: None,
        payment_intent_id: None,
        payment_amount: None,
        paid_at: None,
        created_at: Utc::now(),
        approved_at: None,
        completed_at: None,
        cancelled_at: None,
    };
    tables.projects.push(project.clone());
    Ok(project)
}

fn insert_payment(tables: &mut Tables, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse> {
    if tables.payments.iter().any(|p| p.stripe_id == request.stripe_id) {
        return Err(unique_violation("payments", "payments_stripe_id_unique"));
    }
    let now = Utc::now();
    let payment = PaymentDBResponse {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        amount: request.amount,
        currency: request.currency,
        status: request.status,
        payment_method: request.payment_method.clone(),
        payment_type: request.payment_type,
        invoice_id: request.invoice_id,
        project_id: request.project_id,
        stripe_id: request.stripe_id.clone(),
        created_at: now,
        updated_at: now,
    };
    tables.payments.push(payment.clone());
    Ok(payment)
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.email.eq_ignore_ascii_case(&request.email)) {
            return Err(unique_violation("users", "users_email_unique"));
        }
        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            display_name: request.display_name.clone(),
            photo_url: request.photo_url.clone(),
            phone: None,
            company: None,
            bio: None,
            is_admin: request.is_admin,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.users, |_| true))
    }

    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound)?;
        if let Some(name) = &request.display_name {
            user.display_name = Some(name.clone());
        }
        if let Some(photo) = &request.photo_url {
            user.photo_url = Some(photo.clone());
        }
        if let Some(phone) = &request.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(company) = &request.company {
            user.company = Some(company.clone());
        }
        if let Some(bio) = &request.bio {
            user.bio = Some(bio.clone());
        }
        if let Some(is_admin) = request.is_admin {
            user.is_admin = is_admin;
        }
        if let Some(status) = request.status {
            user.status = status;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn create_request(&self, request: &RequestCreateDBRequest) -> Result<RequestDBResponse> {
        let mut tables = self.tables.lock().await;
        let row = RequestDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            user_email: request.user_email.clone(),
            user_name: request.user_name.clone(),
            website_type: request.website_type.clone(),
            features: request.features.clone(),
            deadline: request.deadline,
            budget: request.budget.clone(),
            design_preferences: request.design_preferences.clone(),
            additional_notes: request.additional_notes.clone(),
            status: RequestStatus::Pending,
            quoted_budget: None,
            currency: request.currency,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            held_at: None,
            held_by: None,
            hold_reason: None,
        };
        tables.requests.push(row.clone());
        Ok(row)
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<RequestDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(tables.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn list_requests(&self, filter: &OwnerFilter) -> Result<Vec<RequestDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.requests, |r| filter.matches(r.user_id)))
    }

    async fn update_request(&self, id: RequestId, request: &RequestUpdateDBRequest) -> Result<RequestDBResponse> {
        let mut tables = self.tables.lock().await;
        let row = tables.requests.iter_mut().find(|r| r.id == id).ok_or(DbError::NotFound)?;
        apply_request_update(row, request)?;
        Ok(row.clone())
    }

    async fn delete_request(&self, id: RequestId, expected_status: RequestStatus) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let index = tables.requests.iter().position(|r| r.id == id).ok_or(DbError::NotFound)?;
        if tables.requests[index].status != expected_status {
            return Err(stale("request", id));
        }
        tables.requests.remove(index);
        Ok(())
    }

    async fn approve_request(
        &self,
        id: RequestId,
        approval: &RequestUpdateDBRequest,
        project: &ProjectCreateDBRequest,
    ) -> Result<(RequestDBResponse, ProjectDBResponse)> {
        let mut tables = self.tables.lock().await;
        let index = tables.requests.iter().position(|r| r.id == id).ok_or(DbError::NotFound)?;

        // Work on a copy so a failed project insert leaves the request untouched
        let mut updated = tables.requests[index].clone();
        apply_request_update(&mut updated, approval)?;
        let created = insert_project(&mut tables, project)?;
        tables.requests[index] = updated.clone();
        Ok((updated, created))
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<ProjectDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(tables.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects(&self, filter: &OwnerFilter) -> Result<Vec<ProjectDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.projects, |p| filter.matches(p.user_id)))
    }

    async fn update_project(&self, id: ProjectId, request: &ProjectUpdateDBRequest) -> Result<ProjectDBResponse> {
        let mut tables = self.tables.lock().await;
        let row = tables.projects.iter_mut().find(|p| p.id == id).ok_or(DbError::NotFound)?;
        apply_project_update(row, request)?;
        Ok(row.clone())
    }

    async fn delete_project(&self, id: ProjectId, expected_status: ProjectStatus) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let index = tables.projects.iter().position(|p| p.id == id).ok_or(DbError::NotFound)?;
        let project = &tables.projects[index];
        if project.status != expected_status || project.payment_status != PaymentStatus::Pending {
            return Err(stale("project", id));
        }
        tables.projects.remove(index);
        Ok(())
    }

    async fn complete_checkout(
        &self,
        id: ProjectId,
        update: &ProjectUpdateDBRequest,
        payment: Option<&PaymentCreateDBRequest>,
    ) -> Result<ProjectDBResponse> {
        let mut tables = self.tables.lock().await;
        let index = tables.projects.iter().position(|p| p.id == id).ok_or(DbError::NotFound)?;

        let mut updated = tables.projects[index].clone();
        apply_project_update(&mut updated, update)?;
        if let Some(payment) = payment {
            insert_payment(&mut tables, payment)?;
        }
        tables.projects[index] = updated.clone();
        Ok(updated)
    }

    async fn create_invoice(&self, request: &InvoiceCreateDBRequest) -> Result<InvoiceDBResponse> {
        let mut tables = self.tables.lock().await;
        if tables.invoices.iter().any(|i| i.invoice_number == request.invoice_number) {
            return Err(unique_violation("invoices", "invoices_invoice_number_key"));
        }
        let invoice = InvoiceDBResponse {
            id: Uuid::new_v4(),
            invoice_number: request.invoice_number.clone(),
            user_id: request.user_id,
            user_name: request.user_name.clone(),
            user_email: request.user_email.clone(),
            project_id: request.project_id,
            amount: request.amount,
            currency: request.currency,
            status: Default::default(),
            issue_date: request.issue_date,
            due_date: request.due_date,
            paid_date: None,
            items: sqlx::types::Json(request.items.clone()),
            created_at: Utc::now(),
        };
        tables.invoices.push(invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<InvoiceDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(tables.invoices.iter().find(|i| i.id == id).cloned())
    }

    async fn list_invoices(&self, filter: &OwnerFilter) -> Result<Vec<InvoiceDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.invoices, |i| filter.matches(i.user_id)))
    }

    async fn update_invoice(&self, id: InvoiceId, request: &InvoiceUpdateDBRequest) -> Result<InvoiceDBResponse> {
        let mut tables = self.tables.lock().await;
        let invoice = tables.invoices.iter_mut().find(|i| i.id == id).ok_or(DbError::NotFound)?;
        if invoice.status != request.expected_status {
            return Err(stale("invoice", id));
        }
        invoice.status = request.status;
        invoice.paid_date = request.paid_date.or(invoice.paid_date);
        Ok(invoice.clone())
    }

    async fn create_payment(&self, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse> {
        let mut tables = self.tables.lock().await;
        insert_payment(&mut tables, request)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(tables.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn list_payments(&self, filter: &OwnerFilter) -> Result<Vec<PaymentDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.payments, |p| filter.matches(p.user_id)))
    }

    async fn update_payment(&self, id: PaymentId, request: &PaymentUpdateDBRequest) -> Result<PaymentDBResponse> {
        let mut tables = self.tables.lock().await;
        let payment = tables.payments.iter_mut().find(|p| p.id == id).ok_or(DbError::NotFound)?;
        if payment.status != request.expected_status {
            return Err(stale("payment", id));
        }
        payment.status = request.status;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn upsert_transfer(&self, request: &TransferUpsertDBRequest) -> Result<TransferDBResponse> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.transfers.iter_mut().find(|t| t.transfer_id == request.transfer_id) {
            existing.status = existing.status.max(request.status);
            existing.paid_at = existing.paid_at.or(request.paid_at);
            return Ok(existing.clone());
        }
        let transfer = TransferDBResponse {
            id: Uuid::new_v4(),
            transfer_id: request.transfer_id.clone(),
            amount: request.amount,
            currency: request.currency,
            destination: request.destination.clone(),
            transfer_group: request.transfer_group.clone(),
            status: request.status,
            created_at: Utc::now(),
            paid_at: request.paid_at,
        };
        tables.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn list_transfers(&self) -> Result<Vec<TransferDBResponse>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(&tables.transfers, |_| true))
    }

    async fn claim_event(&self, event_id: &str, _event_type: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables.events.insert(event_id.to_string()))
    }

    async fn release_event(&self, event_id: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.events.remove(event_id);
        Ok(())
    }
}
