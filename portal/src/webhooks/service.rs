//! Processing of verified gateway events.
//!
//! Every event is claimed by id before any side effect, so a redelivery of an event that was
//! already handled is acknowledged without touching anything. If processing fails the claim is
//! released and the gateway's own retry delivers the event again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::PayoutConfig,
    db::{
        Store,
        errors::DbError,
        models::{
            payments::PaymentCreateDBRequest,
            projects::{ProjectDBResponse, ProjectUpdateDBRequest},
            transfers::TransferUpsertDBRequest,
        },
    },
    lifecycle::{
        payment::{PaymentRecordStatus, PaymentType, TransferStatus},
        project::{PaymentStatus, ProjectAction, ProjectStatus},
    },
    money::MoneyError,
    payment_providers::{PaymentError, PaymentProvider, TransferRequest},
    types::ProjectId,
    webhooks::events::{CheckoutSessionObject, EventKind, GatewayEvent, PaymentIntentObject, TransferObject},
};

/// Prefix of transfer groups created for project checkouts
pub const TRANSFER_GROUP_PREFIX: &str = "project_";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid amount in event: {0}")]
    Amount(#[from] MoneyError),

    #[error("checkout session {session_id} has unusable metadata: {reason}")]
    Metadata { session_id: String, reason: String },

    #[error("project {0} referenced by event does not exist")]
    UnknownProject(ProjectId),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// What happened to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    /// Already claimed by an earlier delivery
    Duplicate,
    /// Not an event, or not an object, the portal acts on
    Ignored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Processed => "processed",
            Outcome::Duplicate => "duplicate",
            Outcome::Ignored => "ignored",
        }
    }
}

pub struct WebhookProcessor {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    payouts: PayoutConfig,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn PaymentProvider>, payouts: PayoutConfig) -> Self {
        Self { store, provider, payouts }
    }

    /// Claim, process, and release the claim again on failure
    #[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type), err)]
    pub async fn handle(&self, event: &GatewayEvent) -> Result<Outcome, WebhookError> {
        if !self.store.claim_event(&event.id, &event.event_type).await? {
            info!("Event already processed, acknowledging redelivery");
            return Ok(Outcome::Duplicate);
        }

        match self.dispatch(event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(release_err) = self.store.release_event(&event.id).await {
                    error!("Failed to release claim on event {}: {}", event.id, release_err);
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, event: &GatewayEvent) -> Result<Outcome, WebhookError> {
        match event.kind()? {
            EventKind::CheckoutCompleted(session) => self.checkout_completed(&session).await,
            EventKind::PaymentIntentSucceeded(intent) => self.split_funds(&event.id, &intent).await,
            EventKind::TransferCreated(transfer) => self.mirror_transfer(&transfer, TransferStatus::Created).await,
            EventKind::TransferPaid(transfer) => self.mirror_transfer(&transfer, TransferStatus::Paid).await,
            EventKind::Unhandled => {
                debug!("Ignoring webhook event type: {}", event.event_type);
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Mark the installment paid, move the project on, and record the payment
    async fn checkout_completed(&self, session: &CheckoutSessionObject) -> Result<Outcome, WebhookError> {
        let Some(raw_project_id) = session.metadata("projectId") else {
            debug!("Checkout session {} carries no project, ignoring", session.id);
            return Ok(Outcome::Ignored);
        };
        let metadata_error = |reason: String| WebhookError::Metadata {
            session_id: session.id.clone(),
            reason,
        };
        let project_id: ProjectId = Uuid::parse_str(raw_project_id).map_err(|e| metadata_error(format!("projectId: {e}")))?;
        let payment_type = session
            .metadata("type")
            .and_then(PaymentType::from_metadata_tag)
            .ok_or_else(|| metadata_error(format!("type {:?}", session.metadata("type"))))?;

        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or(WebhookError::UnknownProject(project_id))?;

        let amount = match session.total()? {
            Some(total) => total,
            None => payment_type.share_of(project.budget()),
        };
        let now = Utc::now();
        let update = confirmation_update(&project, payment_type, session, amount.amount_minor, now);

        let payment = PaymentCreateDBRequest {
            user_id: project.user_id,
            amount: amount.amount_minor,
            currency: amount.currency,
            status: PaymentRecordStatus::Succeeded,
            payment_method: "card".to_string(),
            payment_type,
            invoice_id: None,
            project_id: Some(project.id),
            stripe_id: session.id.clone(),
        };

        let updated = self.store.complete_checkout(project.id, &update, Some(&payment)).await?;
        info!(
            "Recorded {} payment of {} for project {}; status now '{}'",
            payment_type, amount, project.id, updated.status
        );
        Ok(Outcome::Processed)
    }

    /// Pay a settled intent out to the two payee accounts
    async fn split_funds(&self, event_id: &str, intent: &PaymentIntentObject) -> Result<Outcome, WebhookError> {
        let Some(transfer_group) = intent
            .transfer_group
            .as_deref()
            .filter(|group| group.starts_with(TRANSFER_GROUP_PREFIX))
        else {
            debug!("Payment intent {} is not tied to a project, ignoring", intent.id);
            return Ok(Outcome::Ignored);
        };

        let (primary, secondary) = intent.amount()?.split_evenly();
        let payouts = [
            (primary, self.payouts.primary_account.as_str()),
            (secondary, self.payouts.secondary_account.as_str()),
        ];

        for (n, (amount, destination)) in payouts.into_iter().enumerate() {
            if !amount.is_positive() {
                continue;
            }
            let request = TransferRequest {
                amount,
                destination: destination.to_string(),
                transfer_group: transfer_group.to_string(),
                source_transaction: intent.source_charge().map(str::to_string),
                idempotency_key: format!("{event_id}:payout:{n}"),
            };
            let transfer_id = self.provider.create_transfer(&request).await.inspect_err(|e| {
                error!("Transfer {} of {} to {} failed: {}", n, amount, destination, e);
            })?;

            self.store
                .upsert_transfer(&TransferUpsertDBRequest {
                    transfer_id: transfer_id.clone(),
                    amount: amount.amount_minor,
                    currency: amount.currency,
                    destination: destination.to_string(),
                    transfer_group: Some(transfer_group.to_string()),
                    status: TransferStatus::Created,
                    paid_at: None,
                })
                .await?;
            info!("Transferred {} to {} as {}", amount, destination, transfer_id);
        }
        Ok(Outcome::Processed)
    }

    async fn mirror_transfer(&self, transfer: &TransferObject, status: TransferStatus) -> Result<Outcome, WebhookError> {
        let record = self
            .store
            .upsert_transfer(&TransferUpsertDBRequest {
                transfer_id: transfer.id.clone(),
                amount: transfer.amount,
                currency: transfer.currency.parse()?,
                destination: transfer.destination.clone(),
                transfer_group: transfer.transfer_group.clone(),
                status,
                paid_at: (status == TransferStatus::Paid).then(Utc::now),
            })
            .await?;
        debug!("Transfer {} is now '{}'", record.transfer_id, record.status);
        Ok(Outcome::Processed)
    }
}

/// Project update for a confirmed installment.
///
/// Payment fields are always recorded. The status only moves when the lifecycle allows it from
/// where the project is now; a payment arriving for a project that has moved elsewhere (for
/// example cancelled while the client was on the checkout page) is still recorded, with a warning.
fn confirmation_update(
    project: &ProjectDBResponse,
    payment_type: PaymentType,
    session: &CheckoutSessionObject,
    amount_minor: i64,
    now: chrono::DateTime<Utc>,
) -> ProjectUpdateDBRequest {
    let mut update = ProjectUpdateDBRequest {
        expected_status: Some(project.status),
        payment_status: Some(PaymentStatus::Paid),
        checkout_session_id: Some(session.id.clone()),
        payment_intent_id: session.payment_intent.clone(),
        payment_amount: Some(amount_minor),
        paid_at: Some(now),
        ..Default::default()
    };

    match project.snapshot().transition(ProjectAction::ConfirmPayment(payment_type)) {
        Ok(next) => {
            update.status = Some(next);
            if next == ProjectStatus::Completed {
                update.completed_at = Some(now);
            }
        }
        Err(e) => warn!("Payment for project {} recorded without a status change: {}", project.id, e),
    }
    update
}
