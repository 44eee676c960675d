// ✅ Settlement Coordinator - unsettled → settled, exactly once
//
// The store performs the transition as a single conditional write, so two
// racing settle calls produce one winner. Only the winner notifies.
// Settling an already-settled split is a no-op that returns the stored row.

use crate::entities::{Expense, GroupExpenseSplit};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use crate::identity::{IdentityMap, StableId};
use crate::notifications::Notifier;
use crate::store::{LedgerStore, SettleWrite};
use crate::views::{NotificationView, SplitView};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub split: SplitView,
    /// false when the split was already settled before this call
    pub newly_settled: bool,
}

pub struct SettlementCoordinator {
    store: Arc<dyn LedgerStore>,
    ids: Arc<IdentityMap>,
    notifier: Arc<Notifier>,
}

impl SettlementCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ids: Arc<IdentityMap>,
        notifier: Arc<Notifier>,
    ) -> Self {
        SettlementCoordinator {
            store,
            ids,
            notifier,
        }
    }

    /// Mark a split as paid
    pub fn settle(&self, actor: StableId, split: StableId) -> LedgerResult<SettlementOutcome> {
        let actor_key = self.require_user(actor)?;
        let split_key = self.ids.to_native_key(split)?;

        // Resolve everything the notification needs before the write
        let current = self
            .store
            .get_split(&split_key)?
            .ok_or_else(|| LedgerError::reference(EntityKind::Split, split_key.as_str()))?;
        let expense = self.expense_of(&current)?;

        match self.store.mark_split_settled(&split_key, Utc::now())? {
            SettleWrite::Settled(settled) => {
                info!(
                    split_id = %settled.id,
                    expense_id = %settled.expense_id,
                    amount = %settled.amount,
                    "Split settled"
                );
                self.notifier.payment_settled(&settled, &expense, &actor_key);
                Ok(SettlementOutcome {
                    split: SplitView::new(&settled, &self.ids),
                    newly_settled: true,
                })
            }
            SettleWrite::AlreadySettled(existing) => {
                debug!(split_id = %existing.id, "Repeated settlement ignored");
                Ok(SettlementOutcome {
                    split: SplitView::new(&existing, &self.ids),
                    newly_settled: false,
                })
            }
        }
    }

    /// Nudge the owing member of an unsettled split
    pub fn remind(&self, actor: StableId, split: StableId) -> LedgerResult<NotificationView> {
        let actor_key = self.require_user(actor)?;
        let split_key = self.ids.to_native_key(split)?;

        let split = self
            .store
            .get_split(&split_key)?
            .ok_or_else(|| LedgerError::reference(EntityKind::Split, split_key.as_str()))?;
        if split.is_settled() {
            return Err(LedgerError::AlreadySettled(split.id));
        }

        let expense = self.expense_of(&split)?;
        let reminder = self.notifier.payment_reminder(&split, &expense, &actor_key)?;
        info!(split_id = %split.id, recipient = %split.member_id, "Payment reminder sent");
        Ok(NotificationView::new(&reminder, &self.ids))
    }

    fn expense_of(&self, split: &GroupExpenseSplit) -> LedgerResult<Expense> {
        self.store
            .get_expense(&split.expense_id)?
            .ok_or_else(|| LedgerError::reference(EntityKind::Expense, split.expense_id.as_str()))
    }

    fn require_user(&self, user: StableId) -> LedgerResult<String> {
        let key = self.ids.to_native_key(user)?;
        if !self.store.exists(EntityKind::User, &key)? {
            return Err(LedgerError::reference(EntityKind::User, key));
        }
        Ok(key)
    }
}
