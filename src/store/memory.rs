// 🧪 In-memory Ledger Store - same contract as SQLite, no disk
//
// Writes for one expense are staged first and applied under a single
// write lock, so readers never observe a partial expense.
// `failing_after_splits(n)` simulates an interruption after n split rows.

use super::{expense_references, validate_expense_rows, LedgerStore, SettleWrite};
use crate::entities::{
    Category, Expense, Group, GroupExpenseSplit, GroupMember, Notification, User,
};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    categories: Vec<Category>,
    groups: Vec<Group>,
    members: Vec<GroupMember>,
    expenses: Vec<Expense>,
    splits: Vec<GroupExpenseSplit>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn exists(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::User => self.users.iter().any(|u| u.id == id),
            EntityKind::Category => self.categories.iter().any(|c| c.id == id),
            EntityKind::Group => self.groups.iter().any(|g| g.id == id),
            EntityKind::Expense => self.expenses.iter().any(|e| e.id == id),
            EntityKind::Split => self.splits.iter().any(|s| s.id == id),
            EntityKind::Notification => self.notifications.iter().any(|n| n.id == id),
        }
    }

    fn require(&self, kind: EntityKind, id: &str) -> LedgerResult<()> {
        if self.exists(kind, id) {
            Ok(())
        } else {
            Err(LedgerError::reference(kind, id))
        }
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,

    /// Abort record_expense after this many split rows were staged
    fail_after_splits: Option<usize>,

    /// While set, get_expense reports a storage failure
    expense_reads_fail: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose record_expense fails part-way through the split rows
    pub fn failing_after_splits(count: usize) -> Self {
        MemoryLedgerStore {
            state: RwLock::new(MemoryState::default()),
            fail_after_splits: Some(count),
            expense_reads_fail: AtomicBool::new(false),
        }
    }

    /// Make expense lookups fail (or succeed again)
    pub fn fail_expense_reads(&self, fail: bool) {
        self.expense_reads_fail.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::Storage("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| LedgerError::Storage("memory store lock poisoned".to_string()))
    }
}

fn duplicate(kind: EntityKind, id: &str) -> LedgerError {
    LedgerError::Storage(format!("duplicate {} id {}", kind, id))
}

impl LedgerStore for MemoryLedgerStore {
    fn register_user(&self, user: &User) -> LedgerResult<()> {
        let mut state = self.write()?;
        if state.exists(EntityKind::User, &user.id) {
            return Err(duplicate(EntityKind::User, &user.id));
        }
        state.users.push(user.clone());
        Ok(())
    }

    fn register_category(&self, category: &Category) -> LedgerResult<()> {
        let mut state = self.write()?;
        if state.exists(EntityKind::Category, &category.id) {
            return Err(duplicate(EntityKind::Category, &category.id));
        }
        state.categories.push(category.clone());
        Ok(())
    }

    fn register_group(&self, group: &Group) -> LedgerResult<()> {
        let mut state = self.write()?;
        state.require(EntityKind::User, &group.created_by)?;
        if state.exists(EntityKind::Group, &group.id) {
            return Err(duplicate(EntityKind::Group, &group.id));
        }
        state.groups.push(group.clone());
        Ok(())
    }

    fn add_group_member(&self, member: &GroupMember) -> LedgerResult<()> {
        let mut state = self.write()?;
        state.require(EntityKind::Group, &member.group_id)?;
        state.require(EntityKind::User, &member.user_id)?;

        let already = state
            .members
            .iter()
            .any(|m| m.group_id == member.group_id && m.user_id == member.user_id);
        if !already {
            state.members.push(member.clone());
        }
        Ok(())
    }

    fn exists(&self, kind: EntityKind, id: &str) -> LedgerResult<bool> {
        Ok(self.read()?.exists(kind, id))
    }

    fn get_user(&self, id: &str) -> LedgerResult<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.id == id).cloned())
    }

    fn list_users(&self) -> LedgerResult<Vec<User>> {
        Ok(self.read()?.users.clone())
    }

    fn list_group_members(&self, group_id: &str) -> LedgerResult<Vec<GroupMember>> {
        Ok(self
            .read()?
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    fn record_expense(
        &self,
        expense: &Expense,
        splits: &[GroupExpenseSplit],
    ) -> LedgerResult<Expense> {
        validate_expense_rows(expense, splits)?;

        let mut state = self.write()?;

        for (kind, id) in expense_references(expense, splits) {
            state.require(kind, &id)?;
        }
        if state.exists(EntityKind::Expense, &expense.id) {
            return Err(duplicate(EntityKind::Expense, &expense.id));
        }

        // Stage every split row; nothing touches `state` until all succeed
        let mut staged: Vec<GroupExpenseSplit> = Vec::with_capacity(splits.len());
        let mut staged_ids = HashSet::new();
        for (written, split) in splits.iter().enumerate() {
            if self.fail_after_splits == Some(written) {
                warn!(
                    expense_id = %expense.id,
                    written,
                    "Simulated interruption while recording expense"
                );
                return Err(LedgerError::Storage(format!(
                    "interrupted after {} split rows",
                    written
                )));
            }
            if state.exists(EntityKind::Split, &split.id) || !staged_ids.insert(split.id.as_str()) {
                return Err(duplicate(EntityKind::Split, &split.id));
            }
            staged.push(split.clone());
        }

        state.expenses.push(expense.clone());
        state.splits.extend(staged);

        info!(
            expense_id = %expense.id,
            amount = %expense.amount,
            splits = splits.len(),
            "Expense recorded"
        );
        Ok(expense.clone())
    }

    fn get_expense(&self, id: &str) -> LedgerResult<Option<Expense>> {
        if self.expense_reads_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("expense reads unavailable".to_string()));
        }
        Ok(self.read()?.expenses.iter().find(|e| e.id == id).cloned())
    }

    fn get_split(&self, id: &str) -> LedgerResult<Option<GroupExpenseSplit>> {
        Ok(self.read()?.splits.iter().find(|s| s.id == id).cloned())
    }

    fn list_splits_owed_by(&self, user_id: &str) -> LedgerResult<Vec<GroupExpenseSplit>> {
        Ok(self
            .read()?
            .splits
            .iter()
            .filter(|s| s.member_id == user_id)
            .cloned()
            .collect())
    }

    fn list_splits_for_expense(&self, expense_id: &str) -> LedgerResult<Vec<GroupExpenseSplit>> {
        Ok(self
            .read()?
            .splits
            .iter()
            .filter(|s| s.expense_id == expense_id)
            .cloned()
            .collect())
    }

    fn mark_split_settled(&self, split_id: &str, at: DateTime<Utc>) -> LedgerResult<SettleWrite> {
        let mut state = self.write()?;
        let split = state
            .splits
            .iter_mut()
            .find(|s| s.id == split_id)
            .ok_or_else(|| LedgerError::reference(EntityKind::Split, split_id))?;

        if split.settle(at) {
            Ok(SettleWrite::Settled(split.clone()))
        } else {
            debug!(split_id = split_id, "Split already settled");
            Ok(SettleWrite::AlreadySettled(split.clone()))
        }
    }

    fn insert_notification(&self, notification: &Notification) -> LedgerResult<()> {
        let mut state = self.write()?;
        state.require(EntityKind::User, &notification.recipient_id)?;
        if state.exists(EntityKind::Notification, &notification.id) {
            return Err(duplicate(EntityKind::Notification, &notification.id));
        }
        state.notifications.push(notification.clone());
        Ok(())
    }

    fn get_notification(&self, id: &str) -> LedgerResult<Option<Notification>> {
        Ok(self.read()?.notifications.iter().find(|n| n.id == id).cloned())
    }

    fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> LedgerResult<Vec<Notification>> {
        Ok(self
            .read()?
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.read))
            .cloned()
            .collect())
    }

    fn mark_notification_read(&self, id: &str) -> LedgerResult<Notification> {
        let mut state = self.write()?;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| LedgerError::reference(EntityKind::Notification, id))?;
        notification.read = true;
        Ok(notification.clone())
    }
}
