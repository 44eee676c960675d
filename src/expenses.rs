// 🧾 Expense Service - validate, split, persist, notify
//
// create_expense flow:
//   1. validate amount, description, currency
//   2. resolve stable ids and check references
//   3. group expense: read membership, compute shares (SplitEngine)
//   4. persist expense + split rows atomically (LedgerStore)
//   5. notify owing members and broadcast expense_added (Notifier)
//
// Anything failing before step 4 leaves no trace.

use crate::entities::{Expense, GroupExpenseSplit};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use crate::identity::{IdentityMap, StableId};
use crate::money::{normalize_currency, validate_amount};
use crate::notifications::Notifier;
use crate::split::{SplitEngine, SplitPolicy};
use crate::store::LedgerStore;
use crate::views::{ExpenseView, SplitView};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Client request for a new expense; the payer is the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub amount: Decimal,
    pub description: String,
    pub category_id: StableId,
    #[serde(default)]
    pub group_id: Option<StableId>,
    pub currency: String,
    #[serde(default)]
    pub split: SplitPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedExpense {
    pub expense: ExpenseView,
    pub splits: Vec<SplitView>,
}

pub struct ExpenseService {
    store: Arc<dyn LedgerStore>,
    ids: Arc<IdentityMap>,
    engine: SplitEngine,
    notifier: Arc<Notifier>,
}

impl ExpenseService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ids: Arc<IdentityMap>,
        engine: SplitEngine,
        notifier: Arc<Notifier>,
    ) -> Self {
        ExpenseService {
            store,
            ids,
            engine,
            notifier,
        }
    }

    pub fn create_expense(
        &self,
        current_user: StableId,
        request: NewExpense,
    ) -> LedgerResult<RecordedExpense> {
        let amount = validate_amount(request.amount)?;
        let description = request.description.trim();
        if description.is_empty() {
            return Err(LedgerError::invalid_input("description", "must not be empty"));
        }
        let currency = normalize_currency(&request.currency)?;

        let payer_key = self.require(EntityKind::User, current_user)?;
        let category_key = self.require(EntityKind::Category, request.category_id)?;
        let group_key = request
            .group_id
            .map(|group| self.require(EntityKind::Group, group))
            .transpose()?;

        let expense = Expense::new(
            amount,
            description.to_string(),
            category_key,
            payer_key,
            group_key.clone(),
            currency,
        );

        let splits = match &group_key {
            Some(group_key) => {
                self.build_splits(&expense, current_user, group_key, &request.split)?
            }
            None => {
                if let SplitPolicy::Custom { .. } = request.split {
                    return Err(LedgerError::invalid_input(
                        "split",
                        "a personal expense has nothing to split",
                    ));
                }
                Vec::new()
            }
        };

        let saved = self.store.record_expense(&expense, &splits)?;
        info!(
            expense_id = %saved.id,
            amount = %saved.amount,
            currency = %saved.currency,
            splits = splits.len(),
            "Expense created"
        );

        let delivery = self.notifier.expense_added(&saved, &splits);
        info!(
            expense_id = %saved.id,
            notified = delivery.stored,
            pushed = delivery.pushed,
            "Expense announced"
        );

        Ok(RecordedExpense {
            expense: ExpenseView::new(&saved, &self.ids),
            splits: SplitView::list(&splits, &self.ids),
        })
    }

    pub fn get_expense(&self, expense: StableId) -> LedgerResult<ExpenseView> {
        let key = self.ids.to_native_key(expense)?;
        let found = self
            .store
            .get_expense(&key)?
            .ok_or_else(|| LedgerError::reference(EntityKind::Expense, key))?;
        Ok(ExpenseView::new(&found, &self.ids))
    }

    /// Split rows of one expense; empty for personal expenses
    pub fn splits_for_expense(&self, expense: StableId) -> LedgerResult<Vec<SplitView>> {
        let key = self.require(EntityKind::Expense, expense)?;
        let splits = self.store.list_splits_for_expense(&key)?;
        Ok(SplitView::list(&splits, &self.ids))
    }

    /// Everything the user owes other payers, settled or not
    pub fn splits_owed_by(&self, user: StableId) -> LedgerResult<Vec<SplitView>> {
        let key = self.require(EntityKind::User, user)?;
        let splits = self.store.list_splits_owed_by(&key)?;
        Ok(SplitView::list(&splits, &self.ids))
    }

    fn build_splits(
        &self,
        expense: &Expense,
        payer: StableId,
        group_key: &str,
        policy: &SplitPolicy,
    ) -> LedgerResult<Vec<GroupExpenseSplit>> {
        let members: HashMap<StableId, String> = self
            .store
            .list_group_members(group_key)?
            .into_iter()
            .map(|m| (self.ids.to_stable_id(&m.user_id), m.user_id))
            .collect();
        let member_ids: Vec<StableId> = members.keys().copied().collect();

        let shares = self
            .engine
            .compute_splits(expense.amount, payer, &member_ids, policy)?;

        shares
            .into_iter()
            .map(|share| {
                let member_key = members
                    .get(&share.member)
                    .cloned()
                    .ok_or(LedgerError::NotFound(share.member))?;
                Ok(GroupExpenseSplit::new(expense.id.clone(), member_key, share.owed))
            })
            .collect()
    }

    fn require(&self, kind: EntityKind, id: StableId) -> LedgerResult<String> {
        let key = self.ids.to_native_key(id)?;
        if !self.store.exists(kind, &key)? {
            return Err(LedgerError::reference(kind, key));
        }
        Ok(key)
    }
}
