use super::TransitionError;
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Which half of the project budget a payment covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Initial,
    Final,
}

impl PaymentType {
    /// Value carried in checkout session metadata under `type`
    pub fn metadata_tag(&self) -> &'static str {
        match self {
            PaymentType::Initial => "initial_payment",
            PaymentType::Final => "final_payment",
        }
    }

    pub fn from_metadata_tag(tag: &str) -> Option<Self> {
        match tag {
            "initial_payment" => Some(PaymentType::Initial),
            "final_payment" => Some(PaymentType::Final),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Initial => "initial",
            PaymentType::Final => "final",
        }
    }

    /// The share of `budget` due for this installment. The initial payment is the floor half,
    /// the final payment the remainder.
    pub fn share_of(&self, budget: Money) -> Money {
        let (initial, remainder) = budget.split_evenly();
        match self {
            PaymentType::Initial => initial,
            PaymentType::Final => remainder,
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Succeeded => "succeeded",
            PaymentRecordStatus::Failed => "failed",
            PaymentRecordStatus::Refunded => "refunded",
        }
    }

    /// Only settled payments can be refunded
    pub fn refund(self) -> Result<PaymentRecordStatus, TransitionError> {
        match self {
            PaymentRecordStatus::Succeeded => Ok(PaymentRecordStatus::Refunded),
            from => Err(TransitionError::NotAllowed {
                entity: "payment",
                action: "refund",
                from: from.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirror of a gateway transfer's lifecycle. Ordered so that a late `created` event never
/// overwrites `paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Created,
    Paid,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Created => "created",
            TransferStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[test]
    fn test_installments_cover_the_budget() {
        let budget = Money::new(15001, Currency::Gbp);
        let initial = PaymentType::Initial.share_of(budget);
        let remainder = PaymentType::Final.share_of(budget);
        assert_eq!(initial.amount_minor, 7500);
        assert_eq!(remainder.amount_minor, 7501);
        assert_eq!(initial.amount_minor + remainder.amount_minor, budget.amount_minor);
    }

    #[test]
    fn test_metadata_tags() {
        for kind in [PaymentType::Initial, PaymentType::Final] {
            assert_eq!(PaymentType::from_metadata_tag(kind.metadata_tag()), Some(kind));
        }
        assert_eq!(PaymentType::from_metadata_tag("deposit"), None);
    }

    #[test]
    fn test_refund_only_from_succeeded() {
        assert_eq!(PaymentRecordStatus::Succeeded.refund(), Ok(PaymentRecordStatus::Refunded));
        for status in [
            PaymentRecordStatus::Pending,
            PaymentRecordStatus::Failed,
            PaymentRecordStatus::Refunded,
        ] {
            assert!(status.refund().is_err());
        }
    }

    #[test]
    fn test_transfer_status_ordering() {
        assert_eq!(TransferStatus::Paid.max(TransferStatus::Created), TransferStatus::Paid);
    }
}
