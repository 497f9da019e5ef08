//! Project delivery lifecycle.
//!
//! ```text
//! awaiting payment --advance [paid]-----------> in progress
//! awaiting payment --initial payment confirmed-> in progress
//! in progress      --advance------------------> client review
//! client review    --advance [client approved]-> final review
//! final review     --advance------------------> completed
//! final review     --final payment confirmed---> completed
//! (any non-terminal) --cancel-----------------> cancelled
//! ```
//!
//! `payment_status` moves independently and only forward: `pending < checkout_created < paid`.

use super::{TransitionError, payment::PaymentType};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    #[sqlx(rename = "awaiting payment")]
    #[serde(rename = "awaiting payment")]
    AwaitingPayment,
    #[sqlx(rename = "in progress")]
    #[serde(rename = "in progress")]
    InProgress,
    #[sqlx(rename = "client review")]
    #[serde(rename = "client review")]
    ClientReview,
    #[sqlx(rename = "final review")]
    #[serde(rename = "final review")]
    FinalReview,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::AwaitingPayment => "awaiting payment",
            ProjectStatus::InProgress => "in progress",
            ProjectStatus::ClientReview => "client review",
            ProjectStatus::FinalReview => "final review",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    CheckoutCreated,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::CheckoutCreated => "checkout_created",
            PaymentStatus::Paid => "paid",
        }
    }

    /// Move towards `next` without ever going backwards
    pub fn advance_to(self, next: PaymentStatus) -> PaymentStatus {
        self.max(next)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    /// Admin moves the project to the next delivery stage
    Advance,
    /// Gateway confirmed an installment
    ConfirmPayment(PaymentType),
    /// Admin abandons the project
    Cancel,
}

impl ProjectAction {
    fn verb(&self) -> &'static str {
        match self {
            ProjectAction::Advance => "advance",
            ProjectAction::ConfirmPayment(PaymentType::Initial) => "confirm the initial payment of",
            ProjectAction::ConfirmPayment(PaymentType::Final) => "confirm the final payment of",
            ProjectAction::Cancel => "cancel",
        }
    }
}

/// The fields of a project that transition guards look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub status: ProjectStatus,
    pub payment_status: PaymentStatus,
    pub client_approved: bool,
}

impl ProjectSnapshot {
    /// Look up `(status, action)` in the transition table
    pub fn transition(&self, action: ProjectAction) -> Result<ProjectStatus, TransitionError> {
        use ProjectAction::*;
        use ProjectStatus::*;

        match (self.status, action) {
            (AwaitingPayment, Advance) if self.payment_status != PaymentStatus::Paid => Err(TransitionError::GuardFailed {
                entity: "project",
                action: action.verb(),
                reason: "the initial payment has not been received",
            }),
            (AwaitingPayment, Advance) => Ok(InProgress),
            (InProgress, Advance) => Ok(ClientReview),
            (ClientReview, Advance) if !self.client_approved => Err(TransitionError::GuardFailed {
                entity: "project",
                action: action.verb(),
                reason: "the client has not approved the work",
            }),
            (ClientReview, Advance) => Ok(FinalReview),
            (FinalReview, Advance) => Ok(Completed),
            (AwaitingPayment, ConfirmPayment(PaymentType::Initial)) => Ok(InProgress),
            (FinalReview, ConfirmPayment(PaymentType::Final)) => Ok(Completed),
            (from, Cancel) if !from.is_terminal() => Ok(Cancelled),
            (from, action) => Err(TransitionError::NotAllowed {
                entity: "project",
                action: action.verb(),
                from: from.as_str().to_string(),
            }),
        }
    }

    /// Resolve an admin request to move the project to `target`.
    ///
    /// `cancelled` maps to [`ProjectAction::Cancel`]; any other target must be the next stage.
    pub fn advance_to(&self, target: ProjectStatus) -> Result<ProjectStatus, TransitionError> {
        if target == ProjectStatus::Cancelled {
            return self.transition(ProjectAction::Cancel);
        }
        let next = self.transition(ProjectAction::Advance)?;
        if next != target {
            return Err(TransitionError::NotAllowed {
                entity: "project",
                action: "skip stages of",
                from: self.status.as_str().to_string(),
            });
        }
        Ok(next)
    }

    /// Which installment, if any, the client can pay right now
    pub fn payment_due(&self) -> Result<PaymentType, TransitionError> {
        match self.status {
            ProjectStatus::AwaitingPayment if self.payment_status != PaymentStatus::Paid => Ok(PaymentType::Initial),
            ProjectStatus::FinalReview if self.client_approved => Ok(PaymentType::Final),
            ProjectStatus::FinalReview => Err(TransitionError::GuardFailed {
                entity: "project",
                action: "take the final payment for",
                reason: "the client has not approved the work",
            }),
            from => Err(TransitionError::NotAllowed {
                entity: "project",
                action: "take a payment for",
                from: from.as_str().to_string(),
            }),
        }
    }

    /// Client sign-off happens only during client review and leaves the status alone
    pub fn ensure_client_review(&self) -> Result<(), TransitionError> {
        if self.status == ProjectStatus::ClientReview {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                entity: "project",
                action: "approve",
                from: self.status.as_str().to_string(),
            })
        }
    }

    /// A project can be removed only before any money has been involved
    pub fn ensure_deletable(&self) -> Result<(), TransitionError> {
        if self.status == ProjectStatus::AwaitingPayment && self.payment_status == PaymentStatus::Pending {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                entity: "project",
                action: "delete",
                from: self.status.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectStatus::*;

    fn snapshot(status: ProjectStatus, payment_status: PaymentStatus, client_approved: bool) -> ProjectSnapshot {
        ProjectSnapshot {
            status,
            payment_status,
            client_approved,
        }
    }

    #[test]
    fn test_advance_out_of_awaiting_payment_requires_payment() {
        let paid = snapshot(AwaitingPayment, PaymentStatus::Paid, false);
        assert_eq!(paid.advance_to(InProgress), Ok(InProgress));

        for unpaid in [PaymentStatus::Pending, PaymentStatus::CheckoutCreated] {
            let project = snapshot(AwaitingPayment, unpaid, false);
            assert!(matches!(
                project.advance_to(InProgress),
                Err(TransitionError::GuardFailed { .. })
            ));
        }
    }

    #[test]
    fn test_final_review_requires_client_approval() {
        let unapproved = snapshot(ClientReview, PaymentStatus::Paid, false);
        assert!(matches!(
            unapproved.advance_to(FinalReview),
            Err(TransitionError::GuardFailed { .. })
        ));

        let approved = snapshot(ClientReview, PaymentStatus::Paid, true);
        assert_eq!(approved.advance_to(FinalReview), Ok(FinalReview));
    }

    #[test]
    fn test_full_delivery_path() {
        let mut project = snapshot(AwaitingPayment, PaymentStatus::Paid, false);
        for expected in [InProgress, ClientReview] {
            project.status = project.advance_to(expected).unwrap();
        }
        project.client_approved = true;
        for expected in [FinalReview, Completed] {
            project.status = project.advance_to(expected).unwrap();
        }
        assert_eq!(project.status, Completed);
        assert!(project.transition(ProjectAction::Advance).is_err());
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        let project = snapshot(InProgress, PaymentStatus::Paid, true);
        assert!(matches!(
            project.advance_to(Completed),
            Err(TransitionError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_payment_confirmations() {
        let awaiting = snapshot(AwaitingPayment, PaymentStatus::CheckoutCreated, false);
        assert_eq!(
            awaiting.transition(ProjectAction::ConfirmPayment(PaymentType::Initial)),
            Ok(InProgress)
        );
        assert!(awaiting.transition(ProjectAction::ConfirmPayment(PaymentType::Final)).is_err());

        let final_review = snapshot(FinalReview, PaymentStatus::Paid, true);
        assert_eq!(
            final_review.transition(ProjectAction::ConfirmPayment(PaymentType::Final)),
            Ok(Completed)
        );
    }

    #[test]
    fn test_cancel_from_any_open_state() {
        for status in [AwaitingPayment, InProgress, ClientReview, FinalReview] {
            let project = snapshot(status, PaymentStatus::Pending, false);
            assert_eq!(project.advance_to(Cancelled), Ok(Cancelled));
        }
        for status in [Completed, Cancelled] {
            let project = snapshot(status, PaymentStatus::Paid, true);
            assert!(project.transition(ProjectAction::Cancel).is_err());
        }
    }

    #[test]
    fn test_payment_due() {
        assert_eq!(
            snapshot(AwaitingPayment, PaymentStatus::Pending, false).payment_due(),
            Ok(PaymentType::Initial)
        );
        assert_eq!(
            snapshot(AwaitingPayment, PaymentStatus::CheckoutCreated, false).payment_due(),
            Ok(PaymentType::Initial)
        );
        assert_eq!(
            snapshot(FinalReview, PaymentStatus::Paid, true).payment_due(),
            Ok(PaymentType::Final)
        );
        assert!(snapshot(FinalReview, PaymentStatus::Paid, false).payment_due().is_err());
        assert!(snapshot(InProgress, PaymentStatus::Paid, false).payment_due().is_err());
        assert!(snapshot(AwaitingPayment, PaymentStatus::Paid, false).payment_due().is_err());
    }

    #[test]
    fn test_payment_status_never_regresses() {
        use PaymentStatus::*;
        assert_eq!(Pending.advance_to(CheckoutCreated), CheckoutCreated);
        assert_eq!(CheckoutCreated.advance_to(Paid), Paid);
        assert_eq!(Paid.advance_to(CheckoutCreated), Paid);
        assert_eq!(Paid.advance_to(Pending), Paid);
    }

    #[test]
    fn test_client_review_and_delete_guards() {
        assert!(snapshot(ClientReview, PaymentStatus::Paid, false).ensure_client_review().is_ok());
        assert!(snapshot(InProgress, PaymentStatus::Paid, false).ensure_client_review().is_err());

        assert!(snapshot(AwaitingPayment, PaymentStatus::Pending, false).ensure_deletable().is_ok());
        assert!(
            snapshot(AwaitingPayment, PaymentStatus::CheckoutCreated, false)
                .ensure_deletable()
                .is_err()
        );
        assert!(snapshot(InProgress, PaymentStatus::Paid, false).ensure_deletable().is_err());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&AwaitingPayment).unwrap(), "\"awaiting payment\"");
        assert_eq!(
            serde_json::to_string(&PaymentStatus::CheckoutCreated).unwrap(),
            "\"checkout_created\""
        );
    }
}
