// 🧾 Expense + GroupExpenseSplit entities
//
// An Expense is written once and never changes.
// A GroupExpenseSplit changes exactly once: Unsettled → Settled.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// EXPENSE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Store key (UUID) - never changes
    pub id: String,

    /// Positive amount, two fractional digits
    pub amount: Decimal,

    pub description: String,

    pub category_id: String,

    /// Member treated as having paid the full amount
    pub payer_id: String,

    /// None = personal expense, never split
    pub group_id: Option<String>,

    /// Currency code (e.g., "USD")
    pub currency: String,

    /// Server-assigned, immutable
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        amount: Decimal,
        description: String,
        category_id: String,
        payer_id: String,
        group_id: Option<String>,
        currency: String,
    ) -> Self {
        Expense {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            description,
            category_id,
            payer_id,
            group_id,
            currency,
            created_at: Utc::now(),
        }
    }

    pub fn is_group_expense(&self) -> bool {
        self.group_id.is_some()
    }
}

// ============================================================================
// SPLIT STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitState {
    Unsettled,
    /// Terminal
    Settled,
}

impl SplitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitState::Unsettled => "unsettled",
            SplitState::Settled => "settled",
        }
    }
}

// ============================================================================
// GROUP EXPENSE SPLIT
// ============================================================================

/// Amount one non-payer member owes the payer for a group expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupExpenseSplit {
    pub id: String,
    pub expense_id: String,

    /// Owing member (never the payer)
    pub member_id: String,

    pub amount: Decimal,
    pub settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

impl GroupExpenseSplit {
    pub fn new(expense_id: String, member_id: String, amount: Decimal) -> Self {
        GroupExpenseSplit {
            id: uuid::Uuid::new_v4().to_string(),
            expense_id,
            member_id,
            amount,
            settled: false,
            settled_at: None,
        }
    }

    pub fn state(&self) -> SplitState {
        if self.settled {
            SplitState::Settled
        } else {
            SplitState::Unsettled
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Apply the Unsettled → Settled transition
    ///
    /// Returns false and leaves the split untouched when it is already settled.
    pub fn settle(&mut self, at: DateTime<Utc>) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        self.settled_at = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_expense_creation() {
        let expense = Expense::new(
            dec!(30.00),
            "Dinner".to_string(),
            "cat".to_string(),
            "payer".to_string(),
            Some("group".to_string()),
            "USD".to_string(),
        );

        assert!(!expense.id.is_empty());
        assert!(expense.is_group_expense());
        assert_eq!(expense.amount, dec!(30.00));
    }

    #[test]
    fn test_split_settles_once() {
        let mut split = GroupExpenseSplit::new("e".to_string(), "m".to_string(), dec!(10.00));
        assert_eq!(split.state(), SplitState::Unsettled);
        assert!(split.settled_at.is_none());

        let first = Utc::now();
        assert!(split.settle(first));
        assert_eq!(split.state(), SplitState::Settled);
        assert_eq!(split.settled_at, Some(first));

        let later = first + chrono::Duration::seconds(30);
        assert!(!split.settle(later));
        assert_eq!(split.settled_at, Some(first));
    }
}
