//! Vendor withdrawal requests.

use crate::ids::{PayoutId, UserId};
use crate::money::Money;
use crate::status::PayoutStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bank destination as entered by the vendor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    /// Name on the account
    pub account_holder: String,
    /// Bank name
    pub bank_name: String,
    /// Full account number
    pub account_number: String,
}

impl BankDetails {
    /// Creates bank details
    #[must_use]
    pub fn new(
        account_holder: impl Into<String>,
        bank_name: impl Into<String>,
        account_number: impl Into<String>,
    ) -> Self {
        Self {
            account_holder: account_holder.into(),
            bank_name: bank_name.into(),
            account_number: account_number.into(),
        }
    }

    /// Whether every field has content
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.account_holder, &self.bank_name, &self.account_number]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    /// Snapshot stored on the payout; only the last four digits survive
    #[must_use]
    pub fn masked(&self) -> BankSnapshot {
        let digits: Vec<char> = self
            .account_number
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let keep = digits.len().min(4);
        let tail: String = digits[digits.len() - keep..].iter().collect();
        BankSnapshot {
            account_holder: self.account_holder.trim().to_string(),
            bank_name: self.bank_name.trim().to_string(),
            account_number_masked: format!("****{tail}"),
        }
    }
}

/// Masked bank destination captured at request time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSnapshot {
    /// Name on the account
    pub account_holder: String,
    /// Bank name
    pub bank_name: String,
    /// `****` followed by the last four digits
    pub account_number_masked: String,
}

/// Admin verdict on a payout
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutDecision {
    /// Money was sent
    Approve,
    /// Refused, or the transfer bounced
    Reject,
}

impl PayoutDecision {
    /// Status the payout moves to
    #[must_use]
    pub const fn target_status(self) -> PayoutStatus {
        match self {
            Self::Approve => PayoutStatus::Completed,
            Self::Reject => PayoutStatus::Failed,
        }
    }
}

/// A vendor withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Identifier
    pub id: PayoutId,
    /// Requesting vendor
    pub vendor_id: UserId,
    /// Requested amount
    pub amount: Money,
    /// Current status
    pub status: PayoutStatus,
    /// Destination snapshot
    pub bank: BankSnapshot,
    /// Human-facing reference, `PO-` followed by eight hex digits
    pub reference: String,
    /// Request time
    pub requested_at: DateTime<Utc>,
    /// Completion or failure time
    pub decided_at: Option<DateTime<Utc>>,
    /// Admin note attached to the decision
    pub note: Option<String>,
}

impl Payout {
    /// Builds the reference code for a payout id
    #[must_use]
    pub fn reference_for(id: PayoutId) -> String {
        let simple = id.as_uuid().simple().to_string();
        format!("PO-{}", simple[..8].to_uppercase())
    }

    /// Counted as a provisional hold against the balance
    #[must_use]
    pub const fn is_hold(&self) -> bool {
        self.status.is_hold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_keeps_last_four() {
        let bank = BankDetails::new("Ada Vendor", "First Bank", "1234 5678 9012");
        assert!(bank.is_complete());
        let snapshot = bank.masked();
        assert_eq!(snapshot.account_number_masked, "****9012");
        assert_eq!(snapshot.bank_name, "First Bank");
    }

    #[test]
    fn masking_short_numbers() {
        assert_eq!(
            BankDetails::new("A", "B", "12").masked().account_number_masked,
            "****12"
        );
    }

    #[test]
    fn incomplete_details() {
        assert!(!BankDetails::new("A", " ", "1234").is_complete());
    }

    #[test]
    fn reference_shape() {
        let reference = Payout::reference_for(PayoutId::new());
        assert!(reference.starts_with("PO-"));
        assert_eq!(reference.len(), 11);
        assert!(reference[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
