// 👁️ Views - what leaves the ledger
//
// Entities carry UUID keys; clients only ever see stable integer ids.
// Each view is built from an entity plus the shared IdentityMap.

use crate::entities::{
    Expense, GroupExpenseSplit, GroupMember, MemberRole, Notification, NotificationType, User,
};
use crate::identity::{IdentityMap, StableId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseView {
    pub id: StableId,
    pub amount: Decimal,
    pub description: String,
    pub category_id: StableId,
    pub payer_id: StableId,
    pub group_id: Option<StableId>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl ExpenseView {
    pub fn new(expense: &Expense, ids: &IdentityMap) -> Self {
        ExpenseView {
            id: ids.to_stable_id(&expense.id),
            amount: expense.amount,
            description: expense.description.clone(),
            category_id: ids.to_stable_id(&expense.category_id),
            payer_id: ids.to_stable_id(&expense.payer_id),
            group_id: expense.group_id.as_deref().map(|g| ids.to_stable_id(g)),
            currency: expense.currency.clone(),
            created_at: expense.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitView {
    pub id: StableId,
    pub expense_id: StableId,
    pub member_id: StableId,
    pub amount: Decimal,
    pub settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

impl SplitView {
    pub fn new(split: &GroupExpenseSplit, ids: &IdentityMap) -> Self {
        SplitView {
            id: ids.to_stable_id(&split.id),
            expense_id: ids.to_stable_id(&split.expense_id),
            member_id: ids.to_stable_id(&split.member_id),
            amount: split.amount,
            settled: split.settled,
            settled_at: split.settled_at,
        }
    }

    pub fn list(splits: &[GroupExpenseSplit], ids: &IdentityMap) -> Vec<SplitView> {
        splits.iter().map(|split| SplitView::new(split, ids)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: StableId,
    pub recipient_id: StableId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationView {
    pub fn new(notification: &Notification, ids: &IdentityMap) -> Self {
        NotificationView {
            id: ids.to_stable_id(&notification.id),
            recipient_id: ids.to_stable_id(&notification.recipient_id),
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            message: notification.message.clone(),
            read: notification.read,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: StableId,
    pub name: String,
    pub email: Option<String>,
}

impl UserView {
    pub fn new(user: &User, ids: &IdentityMap) -> Self {
        UserView {
            id: ids.to_stable_id(&user.id),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: StableId,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl MemberView {
    pub fn new(member: &GroupMember, ids: &IdentityMap) -> Self {
        MemberView {
            user_id: ids.to_stable_id(&member.user_id),
            role: member.role,
            joined_at: member.joined_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_expense_view_maps_every_reference() {
        let ids = IdentityMap::new();
        let expense = Expense::new(
            dec!(30.00),
            "Dinner".to_string(),
            "cat-1".to_string(),
            "user-1".to_string(),
            Some("group-1".to_string()),
            "USD".to_string(),
        );

        let view = ExpenseView::new(&expense, &ids);

        assert_eq!(ids.to_native_key(view.id).unwrap(), expense.id);
        assert_eq!(ids.to_native_key(view.payer_id).unwrap(), "user-1");
        assert_eq!(ids.to_native_key(view.group_id.unwrap()).unwrap(), "group-1");
        assert_eq!(ExpenseView::new(&expense, &ids), view);
    }

    #[test]
    fn test_split_view_uses_camel_case_and_string_amounts() {
        let ids = IdentityMap::new();
        let split = GroupExpenseSplit::new("exp-1".to_string(), "user-2".to_string(), dec!(33.34));

        let json = serde_json::to_value(SplitView::new(&split, &ids)).unwrap();

        assert_eq!(json["amount"], "33.34");
        assert_eq!(json["settled"], false);
        assert!(json["settledAt"].is_null());
        assert!(json["memberId"].is_u64());
    }

    #[test]
    fn test_notification_view_exposes_type() {
        let ids = IdentityMap::new();
        let notification = Notification::new(
            "user-2".to_string(),
            NotificationType::PaymentSettled,
            "Payment settled".to_string(),
            "Alice settled 10.00 USD".to_string(),
        );

        let json = serde_json::to_value(NotificationView::new(&notification, &ids)).unwrap();

        assert_eq!(json["type"], "payment_settled");
        assert_eq!(json["read"], false);
    }
}
