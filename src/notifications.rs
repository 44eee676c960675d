// 🔔 Notifier - durable inbox rows plus live fan-out
//
// Two independent paths per ledger event:
//   durable:   one Notification row per affected user (store)
//   ephemeral: one LedgerEvent to every connected listener (channel)
//
// Neither path can fail the operation that triggered it. A failed row
// insert is logged and the remaining recipients are still processed.

use crate::broadcast::{BroadcastChannel, LedgerEvent};
use crate::entities::{Expense, GroupExpenseSplit, Notification, NotificationType};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use crate::identity::{IdentityMap, StableId};
use crate::store::LedgerStore;
use crate::views::{ExpenseView, NotificationView, SplitView};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What a notify pass managed to do
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Notification rows written
    pub stored: usize,
    /// Notification rows that could not be written
    pub failed: usize,
    /// Listeners that accepted the live event
    pub pushed: usize,
}

pub struct Notifier {
    store: Arc<dyn LedgerStore>,
    ids: Arc<IdentityMap>,
    channel: Arc<BroadcastChannel>,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ids: Arc<IdentityMap>,
        channel: Arc<BroadcastChannel>,
    ) -> Self {
        Notifier {
            store,
            ids,
            channel,
        }
    }

    pub fn channel(&self) -> &Arc<BroadcastChannel> {
        &self.channel
    }

    /// Write a single inbox row
    pub fn create_notification(
        &self,
        recipient_id: &str,
        notification_type: NotificationType,
        title: &str,
        message: String,
    ) -> LedgerResult<Notification> {
        let notification = Notification::new(
            recipient_id.to_string(),
            notification_type,
            title.to_string(),
            message,
        );
        self.store.insert_notification(&notification)?;
        debug!(
            recipient = recipient_id,
            kind = notification_type.as_str(),
            "Notification stored"
        );
        Ok(notification)
    }

    /// Owing members get an inbox row; every listener gets the event
    pub fn expense_added(&self, expense: &Expense, splits: &[GroupExpenseSplit]) -> Delivery {
        let mut delivery = Delivery::default();
        let payer = self.display_name(&expense.payer_id);

        for split in splits {
            let message = format!(
                "{} added \"{}\" ({} {}). Your share is {} {}.",
                payer,
                expense.description,
                expense.amount,
                expense.currency,
                split.amount,
                expense.currency
            );
            self.store_quietly(
                &split.member_id,
                NotificationType::ExpenseAdded,
                "New group expense",
                message,
                &mut delivery,
            );
        }

        let event = LedgerEvent::ExpenseAdded {
            expense: ExpenseView::new(expense, &self.ids),
            group_id: expense.group_id.as_deref().map(|g| self.ids.to_stable_id(g)),
        };
        delivery.pushed = self.push(&event);
        delivery
    }

    /// The payer always hears about a settlement; the owing member only
    /// when someone else settled on their behalf
    pub fn payment_settled(
        &self,
        split: &GroupExpenseSplit,
        expense: &Expense,
        settled_by: &str,
    ) -> Delivery {
        let mut delivery = Delivery::default();
        let member = self.display_name(&split.member_id);

        let message = format!(
            "{} settled {} {} for \"{}\".",
            member, split.amount, expense.currency, expense.description
        );
        self.store_quietly(
            &expense.payer_id,
            NotificationType::PaymentSettled,
            "Payment settled",
            message,
            &mut delivery,
        );

        if settled_by != split.member_id {
            let message = format!(
                "{} marked your {} {} share of \"{}\" as settled.",
                self.display_name(settled_by),
                split.amount,
                expense.currency,
                expense.description
            );
            self.store_quietly(
                &split.member_id,
                NotificationType::PaymentSettled,
                "Payment settled",
                message,
                &mut delivery,
            );
        }

        let event = LedgerEvent::PaymentSettled {
            split: SplitView::new(split, &self.ids),
        };
        delivery.pushed = self.push(&event);
        delivery
    }

    /// Reminder rows are the whole point of a remind call, so failures propagate
    pub fn payment_reminder(
        &self,
        split: &GroupExpenseSplit,
        expense: &Expense,
        reminded_by: &str,
    ) -> LedgerResult<Notification> {
        let message = format!(
            "{} reminded you that you owe {} {} for \"{}\".",
            self.display_name(reminded_by),
            split.amount,
            expense.currency,
            expense.description
        );
        self.create_notification(
            &split.member_id,
            NotificationType::PaymentReminder,
            "Payment reminder",
            message,
        )
    }

    /// A user's inbox, newest first
    pub fn list_notifications(
        &self,
        user: StableId,
        unread_only: bool,
    ) -> LedgerResult<Vec<NotificationView>> {
        let user_key = self.require_user(user)?;
        let notifications = self.store.list_notifications(&user_key, unread_only)?;
        Ok(notifications
            .iter()
            .map(|n| NotificationView::new(n, &self.ids))
            .collect())
    }

    /// Mark one of the user's own notifications as read
    ///
    /// Another user's notification is reported as not found.
    pub fn mark_read(
        &self,
        user: StableId,
        notification: StableId,
    ) -> LedgerResult<NotificationView> {
        let user_key = self.require_user(user)?;
        let notification_key = self.ids.to_native_key(notification)?;

        let owned = self
            .store
            .get_notification(&notification_key)?
            .filter(|n| n.recipient_id == user_key);
        if owned.is_none() {
            return Err(LedgerError::reference(EntityKind::Notification, notification_key));
        }

        let read = self.store.mark_notification_read(&notification_key)?;
        Ok(NotificationView::new(&read, &self.ids))
    }

    fn require_user(&self, user: StableId) -> LedgerResult<String> {
        let key = self.ids.to_native_key(user)?;
        if !self.store.exists(EntityKind::User, &key)? {
            return Err(LedgerError::reference(EntityKind::User, key));
        }
        Ok(key)
    }

    fn store_quietly(
        &self,
        recipient_id: &str,
        notification_type: NotificationType,
        title: &str,
        message: String,
        delivery: &mut Delivery,
    ) {
        match self.create_notification(recipient_id, notification_type, title, message) {
            Ok(_) => delivery.stored += 1,
            Err(e) => {
                error!(
                    recipient = recipient_id,
                    kind = notification_type.as_str(),
                    error = %e,
                    "Failed to store notification"
                );
                delivery.failed += 1;
            }
        }
    }

    fn push(&self, event: &LedgerEvent) -> usize {
        match self.channel.broadcast(event) {
            Ok(delivered) => delivered,
            Err(e) => {
                error!(event = event.kind(), error = %e, "Failed to broadcast event");
                0
            }
        }
    }

    fn display_name(&self, user_id: &str) -> String {
        match self.store.get_user(user_id) {
            Ok(Some(user)) => user.name,
            Ok(None) => "Someone".to_string(),
            Err(e) => {
                warn!(user_id, error = %e, "Could not look up user name");
                "Someone".to_string()
            }
        }
    }
}
