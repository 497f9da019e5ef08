//! PostgreSQL-backed [`Store`].
//!
//! Conditional writes carry the expected status in the `WHERE` clause. When such a write matches
//! no row, a follow-up existence check decides between [`DbError::NotFound`] and
//! [`DbError::StaleState`].

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, migrate::Migrator};
use tracing::instrument;
use uuid::Uuid;

use super::{
    errors::{DbError, Result},
    models::{
        invoices::{InvoiceCreateDBRequest, InvoiceDBResponse, InvoiceUpdateDBRequest},
        payments::{PaymentCreateDBRequest, PaymentDBResponse, PaymentUpdateDBRequest},
        projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectUpdateDBRequest},
        requests::{RequestCreateDBRequest, RequestDBResponse, RequestUpdateDBRequest},
        transfers::{TransferDBResponse, TransferUpsertDBRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    store::{OwnerFilter, Store},
};
use crate::{
    lifecycle::{project::ProjectStatus, request::RequestStatus},
    types::{InvoiceId, PaymentId, ProjectId, RequestId, UserId, abbrev_uuid},
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Schema migrations for the portal database
pub fn migrator() -> &'static Migrator {
    &MIGRATOR
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Explain why a conditional write on `table` matched nothing
    async fn missing_or_stale(&self, table: &'static str, entity: &'static str, id: Uuid) -> DbError {
        let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
        match sqlx::query_scalar::<_, bool>(&query).bind(id).fetch_one(&self.pool).await {
            Ok(true) => DbError::StaleState {
                entity,
                id: id.to_string(),
            },
            Ok(false) => DbError::NotFound,
            Err(e) => e.into(),
        }
    }
}

const OWNER_CLAUSE: &str = "($1::uuid IS NULL OR user_id = $1)";

async fn update_request_in<'e, E: PgExecutor<'e>>(
    executor: E,
    id: RequestId,
    update: &RequestUpdateDBRequest,
) -> Result<Option<RequestDBResponse>> {
    let row = sqlx::query_as::<_, RequestDBResponse>(
        r#"
        UPDATE requests SET
            status = COALESCE($3, status),
            quoted_budget = COALESCE($4, quoted_budget),
            currency = COALESCE($5, currency),
            approved_at = COALESCE($6, approved_at),
            approved_by = COALESCE($7, approved_by),
            rejected_at = COALESCE($8, rejected_at),
            rejected_by = COALESCE($9, rejected_by),
            rejection_reason = COALESCE($10, rejection_reason),
            held_at = COALESCE($11, held_at),
            held_by = COALESCE($12, held_by),
            hold_reason = COALESCE($13, hold_reason)
        WHERE id = $1 AND ($2::text IS NULL OR status = $2)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.expected_status)
    .bind(update.status)
    .bind(update.quoted_budget)
    .bind(update.currency)
    .bind(update.approved_at)
    .bind(update.approved_by)
    .bind(update.rejected_at)
    .bind(update.rejected_by)
    .bind(&update.rejection_reason)
    .bind(update.held_at)
    .bind(update.held_by)
    .bind(&update.hold_reason)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

async fn update_project_in<'e, E: PgExecutor<'e>>(
    executor: E,
    id: ProjectId,
    update: &ProjectUpdateDBRequest,
) -> Result<Option<ProjectDBResponse>> {
    // payment_status only moves forward: pending < checkout_created < paid
    let row = sqlx::query_as::<_, ProjectDBResponse>(
        r#"
        UPDATE projects SET
            status = COALESCE($3, status),
            payment_status = CASE
                WHEN $4::text IS NULL THEN payment_status
                WHEN (CASE payment_status WHEN 'paid' THEN 2 WHEN 'checkout_created' THEN 1 ELSE 0 END)
                    >= (CASE $4::text WHEN 'paid' THEN 2 WHEN 'checkout_created' THEN 1 ELSE 0 END)
                    THEN payment_status
                ELSE $4::text
            END,
            client_approved = COALESCE($5, client_approved),
            client_feedback = COALESCE($6, client_feedback),
            checkout_session_id = COALESCE($7, checkout_session_id),
            payment_intent_id = COALESCE($8, payment_intent_id),
            payment_amount = COALESCE($9, payment_amount),
            paid_at = COALESCE($10, paid_at),
            approved_at = COALESCE($11, approved_at),
            completed_at = COALESCE($12, completed_at),
            cancelled_at = COALESCE($13, cancelled_at)
        WHERE id = $1 AND ($2::text IS NULL OR status = $2)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.expected_status)
    .bind(update.status)
    .bind(update.payment_status)
    .bind(update.client_approved)
    .bind(&update.client_feedback)
    .bind(&update.checkout_session_id)
    .bind(&update.payment_intent_id)
    .bind(update.payment_amount)
    .bind(update.paid_at)
    .bind(update.approved_at)
    .bind(update.completed_at)
    .bind(update.cancelled_at)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

async fn insert_project<'e, E: PgExecutor<'e>>(executor: E, request: &ProjectCreateDBRequest) -> Result<ProjectDBResponse> {
    let project = sqlx::query_as::<_, ProjectDBResponse>(
        r#"
        INSERT INTO projects (
            id, request_id, user_id, user_email, user_name, website_type, features,
            budget, currency, deadline, design_preferences, additional_notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.request_id)
    .bind(request.user_id)
    .bind(&request.user_email)
    .bind(&request.user_name)
    .bind(&request.website_type)
    .bind(&request.features)
    .bind(request.budget)
    .bind(request.currency)
    .bind(request.deadline)
    .bind(&request.design_preferences)
    .bind(&request.additional_notes)
    .fetch_one(executor)
    .await?;
    Ok(project)
}

async fn insert_payment<'e, E: PgExecutor<'e>>(executor: E, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse> {
    let payment = sqlx::query_as::<_, PaymentDBResponse>(
        r#"
        INSERT INTO payments (
            id, user_id, amount, currency, status, payment_method, payment_type,
            invoice_id, project_id, stripe_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.user_id)
    .bind(request.amount)
    .bind(request.currency)
    .bind(request.status)
    .bind(&request.payment_method)
    .bind(request.payment_type)
    .bind(request.invoice_id)
    .bind(request.project_id)
    .bind(&request.stripe_id)
    .fetch_one(executor)
    .await?;
    Ok(payment)
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, email, display_name, photo_url, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(&request.photo_url)
        .bind(request.is_admin)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                photo_url = COALESCE($3, photo_url),
                phone = COALESCE($4, phone),
                company = COALESCE($5, company),
                bio = COALESCE($6, bio),
                is_admin = COALESCE($7, is_admin),
                status = COALESCE($8, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.display_name)
        .bind(&request.photo_url)
        .bind(&request.phone)
        .bind(&request.company)
        .bind(&request.bio)
        .bind(request.is_admin)
        .bind(request.status)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create_request(&self, request: &RequestCreateDBRequest) -> Result<RequestDBResponse> {
        let row = sqlx::query_as::<_, RequestDBResponse>(
            r#"
            INSERT INTO requests (
                id, user_id, user_email, user_name, website_type, features, deadline,
                budget, design_preferences, additional_notes, currency
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.user_email)
        .bind(&request.user_name)
        .bind(&request.website_type)
        .bind(&request.features)
        .bind(request.deadline)
        .bind(&request.budget)
        .bind(&request.design_preferences)
        .bind(&request.additional_notes)
        .bind(request.currency)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self), fields(request_id = %abbrev_uuid(&id)), err)]
    async fn get_request(&self, id: RequestId) -> Result<Option<RequestDBResponse>> {
        let row = sqlx::query_as::<_, RequestDBResponse>("SELECT * FROM requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    async fn list_requests(&self, filter: &OwnerFilter) -> Result<Vec<RequestDBResponse>> {
        let query = format!("SELECT * FROM requests WHERE {OWNER_CLAUSE} ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, RequestDBResponse>(&query)
            .bind(filter.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(request_id = %abbrev_uuid(&id)), err)]
    async fn update_request(&self, id: RequestId, request: &RequestUpdateDBRequest) -> Result<RequestDBResponse> {
        match update_request_in(&self.pool, id, request).await? {
            Some(row) => Ok(row),
            None => Err(self.missing_or_stale("requests", "request", id).await),
        }
    }

    #[instrument(skip(self), fields(request_id = %abbrev_uuid(&id)), err)]
    async fn delete_request(&self, id: RequestId, expected_status: RequestStatus) -> Result<()> {
        let result = sqlx::query("DELETE FROM requests WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected_status)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.missing_or_stale("requests", "request", id).await);
        }
        Ok(())
    }

    #[instrument(skip(self, approval, project), fields(request_id = %abbrev_uuid(&id)), err)]
    async fn approve_request(
        &self,
        id: RequestId,
        approval: &RequestUpdateDBRequest,
        project: &ProjectCreateDBRequest,
    ) -> Result<(RequestDBResponse, ProjectDBResponse)> {
        let mut tx = self.pool.begin().await?;

        let Some(request) = update_request_in(&mut *tx, id, approval).await? else {
            tx.rollback().await?;
            return Err(self.missing_or_stale("requests", "request", id).await);
        };
        let project = insert_project(&mut *tx, project).await?;

        tx.commit().await?;
        Ok((request, project))
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn get_project(&self, id: ProjectId) -> Result<Option<ProjectDBResponse>> {
        let row = sqlx::query_as::<_, ProjectDBResponse>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    async fn list_projects(&self, filter: &OwnerFilter) -> Result<Vec<ProjectDBResponse>> {
        let query = format!("SELECT * FROM projects WHERE {OWNER_CLAUSE} ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, ProjectDBResponse>(&query)
            .bind(filter.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn update_project(&self, id: ProjectId, request: &ProjectUpdateDBRequest) -> Result<ProjectDBResponse> {
        match update_project_in(&self.pool, id, request).await? {
            Some(row) => Ok(row),
            None => Err(self.missing_or_stale("projects", "project", id).await),
        }
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn delete_project(&self, id: ProjectId, expected_status: ProjectStatus) -> Result<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND status = $2 AND payment_status = 'pending'")
            .bind(id)
            .bind(expected_status)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.missing_or_stale("projects", "project", id).await);
        }
        Ok(())
    }

    #[instrument(skip(self, update, payment), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn complete_checkout(
        &self,
        id: ProjectId,
        update: &ProjectUpdateDBRequest,
        payment: Option<&PaymentCreateDBRequest>,
    ) -> Result<ProjectDBResponse> {
        let mut tx = self.pool.begin().await?;

        let Some(project) = update_project_in(&mut *tx, id, update).await? else {
            tx.rollback().await?;
            return Err(self.missing_or_stale("projects", "project", id).await);
        };
        if let Some(payment) = payment {
            insert_payment(&mut *tx, payment).await?;
        }

        tx.commit().await?;
        Ok(project)
    }

    #[instrument(skip(self, request), fields(invoice_number = %request.invoice_number), err)]
    async fn create_invoice(&self, request: &InvoiceCreateDBRequest) -> Result<InvoiceDBResponse> {
        let invoice = sqlx::query_as::<_, InvoiceDBResponse>(
            r#"
            INSERT INTO invoices (
                id, invoice_number, user_id, user_name, user_email, project_id,
                amount, currency, issue_date, due_date, items
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.invoice_number)
        .bind(request.user_id)
        .bind(&request.user_name)
        .bind(&request.user_email)
        .bind(request.project_id)
        .bind(request.amount)
        .bind(request.currency)
        .bind(request.issue_date)
        .bind(request.due_date)
        .bind(sqlx::types::Json(&request.items))
        .fetch_one(&self.pool)
        .await?;
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %abbrev_uuid(&id)), err)]
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<InvoiceDBResponse>> {
        let row = sqlx::query_as::<_, InvoiceDBResponse>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    async fn list_invoices(&self, filter: &OwnerFilter) -> Result<Vec<InvoiceDBResponse>> {
        let query = format!("SELECT * FROM invoices WHERE {OWNER_CLAUSE} ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, InvoiceDBResponse>(&query)
            .bind(filter.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(invoice_id = %abbrev_uuid(&id)), err)]
    async fn update_invoice(&self, id: InvoiceId, request: &InvoiceUpdateDBRequest) -> Result<InvoiceDBResponse> {
        let row = sqlx::query_as::<_, InvoiceDBResponse>(
            r#"
            UPDATE invoices SET status = $3, paid_date = COALESCE($4, paid_date)
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.expected_status)
        .bind(request.status)
        .bind(request.paid_date)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row),
            None => Err(self.missing_or_stale("invoices", "invoice", id).await),
        }
    }

    #[instrument(skip(self, request), fields(stripe_id = %request.stripe_id), err)]
    async fn create_payment(&self, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse> {
        insert_payment(&self.pool, request).await
    }

    #[instrument(skip(self), fields(payment_id = %abbrev_uuid(&id)), err)]
    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentDBResponse>> {
        let row = sqlx::query_as::<_, PaymentDBResponse>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    async fn list_payments(&self, filter: &OwnerFilter) -> Result<Vec<PaymentDBResponse>> {
        let query = format!("SELECT * FROM payments WHERE {OWNER_CLAUSE} ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, PaymentDBResponse>(&query)
            .bind(filter.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(payment_id = %abbrev_uuid(&id)), err)]
    async fn update_payment(&self, id: PaymentId, request: &PaymentUpdateDBRequest) -> Result<PaymentDBResponse> {
        let row = sqlx::query_as::<_, PaymentDBResponse>(
            r#"
            UPDATE payments SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.expected_status)
        .bind(request.status)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row),
            None => Err(self.missing_or_stale("payments", "payment", id).await),
        }
    }

    #[instrument(skip(self, request), fields(transfer_id = %request.transfer_id), err)]
    async fn upsert_transfer(&self, request: &TransferUpsertDBRequest) -> Result<TransferDBResponse> {
        let row = sqlx::query_as::<_, TransferDBResponse>(
            r#"
            INSERT INTO transfers (id, transfer_id, amount, currency, destination, transfer_group, status, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (transfer_id) DO UPDATE SET
                status = CASE WHEN transfers.status = 'paid' THEN 'paid' ELSE EXCLUDED.status END,
                paid_at = COALESCE(transfers.paid_at, EXCLUDED.paid_at)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.transfer_id)
        .bind(request.amount)
        .bind(request.currency)
        .bind(&request.destination)
        .bind(&request.transfer_group)
        .bind(request.status)
        .bind(request.paid_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    async fn list_transfers(&self) -> Result<Vec<TransferDBResponse>> {
        let rows = sqlx::query_as::<_, TransferDBResponse>("SELECT * FROM transfers ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self), err)]
    async fn claim_event(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO processed_events (event_id, event_type) VALUES ($1, $2) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn release_event(&self, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM processed_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
