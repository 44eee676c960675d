// 🔔 Notification entity - durable per-user event record
//
// Created by the Notifier, read by UI collaborators, flipped unread → read
// once by the recipient. Never deleted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ExpenseAdded,
    PaymentSettled,
    PaymentReminder,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ExpenseAdded => "expense_added",
            NotificationType::PaymentSettled => "payment_settled",
            NotificationType::PaymentReminder => "payment_reminder",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "expense_added" => Some(NotificationType::ExpenseAdded),
            "payment_settled" => Some(NotificationType::PaymentSettled),
            "payment_reminder" => Some(NotificationType::PaymentReminder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: String,
        notification_type: NotificationType,
        title: String,
        message: String,
    ) -> Self {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id,
            notification_type,
            title,
            message,
            read: false,
            created_at: Utc::now(),
        }
    }
}
