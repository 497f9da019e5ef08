//! Hosted checkout for project installments.
//!
//! A checkout is only opened for the installment the project's lifecycle says is due, for exactly
//! that amount. The session id is recorded on the project together with
//! `paymentStatus = checkout_created`; the payment itself is confirmed later by the
//! `checkout.session.completed` webhook.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::{
    api::models::users::CurrentUser,
    db::{Store, models::projects::ProjectUpdateDBRequest},
    errors::{Error, Result},
    lifecycle::{payment::PaymentType, project::PaymentStatus},
    money::Money,
    payment_providers::{CheckoutSession, CheckoutSessionRequest, PaymentProvider},
    types::{Operation, ProjectId, abbrev_uuid},
};

/// A validated request to pay for a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInput {
    pub project_id: ProjectId,
    /// Minor units, in the project's currency
    pub amount: i64,
    pub customer_email: String,
    pub customer_name: Option<String>,
}

pub struct CheckoutService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentProvider>,
    app_url: String,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentProvider>, app_url: &str) -> Self {
        Self {
            store,
            gateway,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Open a hosted checkout for the installment currently due on the project
    #[instrument(skip_all, fields(project_id = %abbrev_uuid(&input.project_id)))]
    pub async fn create_session(&self, caller: &CurrentUser, input: &CheckoutInput) -> Result<CheckoutSession> {
        let project = self
            .store
            .get_project(input.project_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Project".to_string(),
                id: input.project_id.to_string(),
            })?;

        if !caller.can_access(project.user_id) {
            return Err(Error::InsufficientPermissions {
                action: Operation::Pay,
                resource: format!("project {}", project.id),
            });
        }

        let payment_type = project.snapshot().payment_due()?;
        let due = payment_type.share_of(project.budget());
        if input.amount != due.amount_minor {
            return Err(Error::BadRequest {
                message: format!(
                    "Amount {} does not match the {} payment due of {}",
                    Money::new(input.amount, due.currency),
                    payment_type,
                    due
                ),
            });
        }

        let request = CheckoutSessionRequest {
            project_id: project.id,
            payment_type,
            amount: due,
            customer_email: input.customer_email.clone(),
            description: describe(payment_type, project.id),
            transfer_group: project.transfer_group(),
            success_url: format!(
                "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}&project_id={}",
                self.app_url, project.id
            ),
            cancel_url: format!("{}/payment/cancel?project_id={}", self.app_url, project.id),
        };

        let session = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|e| Error::ServiceUnavailable {
                service: "Payment gateway".to_string(),
                message: e.to_string(),
            })?;

        let update = ProjectUpdateDBRequest {
            expected_status: Some(project.status),
            payment_status: Some(PaymentStatus::CheckoutCreated),
            checkout_session_id: Some(session.id.clone()),
            ..Default::default()
        };
        if let Err(e) = self.store.update_project(project.id, &update).await {
            // The session exists at the gateway; its completion webhook still finds the project
            error!(
                "Checkout session {} for project {} could not be recorded: {}",
                session.id, project.id, e
            );
            return Err(e.into());
        }

        metrics::counter!("portal_checkout_sessions_total", "type" => payment_type.as_str()).increment(1);
        info!(
            "Created {} checkout session {} for {}",
            payment_type, session.id, input.customer_name.as_deref().unwrap_or(&input.customer_email)
        );
        Ok(session)
    }
}

fn describe(payment_type: PaymentType, project_id: ProjectId) -> String {
    match payment_type {
        PaymentType::Initial => format!("Initial payment for project #{project_id}"),
        PaymentType::Final => format!("Final payment for project #{project_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryStore,
        lifecycle::{TransitionError, project::ProjectStatus},
        payment_providers::dummy::DummyProvider,
        test_utils::{create_test_project, create_test_user, set_project_state},
    };
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<DummyProvider>,
        service: CheckoutService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(DummyProvider::default());
        let service = CheckoutService::new(store.clone(), gateway.clone(), "https://portal.example.com/");
        Fixture { store, gateway, service }
    }

    fn input(project_id: ProjectId, amount: i64) -> CheckoutInput {
        CheckoutInput {
            project_id,
            amount,
            customer_email: "client@example.com".to_string(),
            customer_name: Some("Ada Client".to_string()),
        }
    }

    #[tokio::test]
    async fn test_initial_checkout_records_session() {
        let f = fixture();
        let owner = create_test_user(f.store.as_ref(), false).await;
        let project = create_test_project(f.store.as_ref(), &owner, 15001).await;

        let session = f
            .service
            .create_session(&owner.clone().into(), &input(project.id, 7500))
            .await
            .unwrap();

        let sessions = f.gateway.sessions().await;
        assert_eq!(sessions.len(), 1);
        let (id, request) = &sessions[0];
        assert_eq!(id, &session.id);
        assert_eq!(request.payment_type, PaymentType::Initial);
        assert_eq!(request.amount.amount_minor, 7500);
        assert_eq!(request.transfer_group, format!("project_{}", project.id));
        assert_eq!(request.description, format!("Initial payment for project #{}", project.id));
        assert_eq!(
            request.cancel_url,
            format!("https://portal.example.com/payment/cancel?project_id={}", project.id)
        );
        assert!(request.success_url.contains("session_id={CHECKOUT_SESSION_ID}"));

        let stored = f.store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::CheckoutCreated);
        assert_eq!(stored.checkout_session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(stored.status, ProjectStatus::AwaitingPayment);
    }

    #[tokio::test]
    async fn test_amount_must_match_installment() {
        let f = fixture();
        let owner = create_test_user(f.store.as_ref(), false).await;
        let project = create_test_project(f.store.as_ref(), &owner, 15000).await;

        let err = f
            .service
            .create_session(&owner.into(), &input(project.id, 15000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
        assert!(f.gateway.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_other_clients_cannot_pay() {
        let f = fixture();
        let owner = create_test_user(f.store.as_ref(), false).await;
        let stranger = create_test_user(f.store.as_ref(), false).await;
        let project = create_test_project(f.store.as_ref(), &owner, 15000).await;

        let err = f
            .service
            .create_session(&stranger.into(), &input(project.id, 7500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientPermissions { .. }));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let f = fixture();
        let owner = create_test_user(f.store.as_ref(), false).await;
        let err = f
            .service
            .create_session(&owner.into(), &input(Uuid::new_v4(), 100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_nothing_due_while_in_progress() {
        let f = fixture();
        let owner = create_test_user(f.store.as_ref(), false).await;
        let project = create_test_project(f.store.as_ref(), &owner, 15000).await;
        set_project_state(f.store.as_ref(), &project, ProjectStatus::InProgress, PaymentStatus::Paid, false).await;

        let err = f
            .service
            .create_session(&owner.into(), &input(project.id, 7500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(TransitionError::NotAllowed { .. })));
    }

    #[tokio::test]
    async fn test_final_checkout_keeps_paid_status() {
        let f = fixture();
        let owner = create_test_user(f.store.as_ref(), false).await;
        let project = create_test_project(f.store.as_ref(), &owner, 15001).await;
        set_project_state(f.store.as_ref(), &project, ProjectStatus::FinalReview, PaymentStatus::Paid, true).await;

        f.service
            .create_session(&owner.into(), &input(project.id, 7501))
            .await
            .unwrap();

        let (_, request) = f.gateway.sessions().await.remove(0);
        assert_eq!(request.payment_type, PaymentType::Final);
        assert!(request.description.starts_with("Final payment"));

        let stored = f.store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert!(stored.checkout_session_id.is_some());
    }
}
