// 🗄️ Ledger Store - persistence contract for expenses, splits, notifications
//
// One trait, two implementations:
// - SqliteLedgerStore: production (rusqlite, one transaction per expense)
// - MemoryLedgerStore: in-memory fake for tests, same contract
//
// Contract highlights:
// - record_expense is all-or-nothing: the expense and every split row
//   become visible together or not at all
// - references (payer, category, group, owing members) are checked
//   before anything is written
// - a split is settled at most once; a second attempt reports the
//   stored row untouched

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLedgerStore;
pub use sqlite::{setup_database, SqliteLedgerStore};

use crate::entities::{
    Category, Expense, Group, GroupExpenseSplit, GroupMember, Notification, User,
};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use crate::money::{is_representable, validate_amount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Outcome of the conditional Unsettled → Settled write
#[derive(Debug, Clone, PartialEq)]
pub enum SettleWrite {
    /// This call performed the transition
    Settled(GroupExpenseSplit),
    /// Someone settled it before; the stored row is returned unchanged
    AlreadySettled(GroupExpenseSplit),
}

impl SettleWrite {
    pub fn split(&self) -> &GroupExpenseSplit {
        match self {
            SettleWrite::Settled(split) | SettleWrite::AlreadySettled(split) => split,
        }
    }

    pub fn into_split(self) -> GroupExpenseSplit {
        match self {
            SettleWrite::Settled(split) | SettleWrite::AlreadySettled(split) => split,
        }
    }
}

pub trait LedgerStore: Send + Sync {
    // ------------------------------------------------------------------
    // Reference data (registered by external collaborators)
    // ------------------------------------------------------------------
    fn register_user(&self, user: &User) -> LedgerResult<()>;
    fn register_category(&self, category: &Category) -> LedgerResult<()>;
    fn register_group(&self, group: &Group) -> LedgerResult<()>;

    /// Both the group and the user must already exist
    fn add_group_member(&self, member: &GroupMember) -> LedgerResult<()>;

    fn exists(&self, kind: EntityKind, id: &str) -> LedgerResult<bool>;
    fn get_user(&self, id: &str) -> LedgerResult<Option<User>>;
    fn list_users(&self) -> LedgerResult<Vec<User>>;
    fn list_group_members(&self, group_id: &str) -> LedgerResult<Vec<GroupMember>>;

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Persist the expense and all its splits as one unit
    fn record_expense(
        &self,
        expense: &Expense,
        splits: &[GroupExpenseSplit],
    ) -> LedgerResult<Expense>;

    fn get_expense(&self, id: &str) -> LedgerResult<Option<Expense>>;
    fn get_split(&self, id: &str) -> LedgerResult<Option<GroupExpenseSplit>>;

    /// Every split (settled or not) where `user_id` is the owing member
    fn list_splits_owed_by(&self, user_id: &str) -> LedgerResult<Vec<GroupExpenseSplit>>;

    fn list_splits_for_expense(&self, expense_id: &str) -> LedgerResult<Vec<GroupExpenseSplit>>;

    /// Conditional transition; unknown ids are `ReferenceNotFound`
    fn mark_split_settled(&self, split_id: &str, at: DateTime<Utc>) -> LedgerResult<SettleWrite>;

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------
    fn insert_notification(&self, notification: &Notification) -> LedgerResult<()>;
    fn get_notification(&self, id: &str) -> LedgerResult<Option<Notification>>;

    /// Newest first
    fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> LedgerResult<Vec<Notification>>;

    /// Unread → read; already-read rows come back unchanged
    fn mark_notification_read(&self, id: &str) -> LedgerResult<Notification>;
}

/// Shape checks shared by every store before an expense is written
pub(crate) fn validate_expense_rows(
    expense: &Expense,
    splits: &[GroupExpenseSplit],
) -> LedgerResult<()> {
    validate_amount(expense.amount)?;
    if expense.description.trim().is_empty() {
        return Err(LedgerError::invalid_input("description", "must not be empty"));
    }
    if expense.group_id.is_none() && !splits.is_empty() {
        return Err(LedgerError::invalid_input(
            "splits",
            "a personal expense cannot carry splits",
        ));
    }
    if expense.group_id.is_some() && splits.is_empty() {
        return Err(LedgerError::invalid_input(
            "splits",
            "a group expense needs at least one owing member",
        ));
    }

    let mut members = HashSet::new();
    for split in splits {
        if split.expense_id != expense.id {
            return Err(LedgerError::invalid_input(
                "splits",
                format!("split {} belongs to another expense", split.id),
            ));
        }
        if split.member_id == expense.payer_id {
            return Err(LedgerError::invalid_input(
                "splits",
                "the payer cannot owe themself",
            ));
        }
        if !members.insert(split.member_id.as_str()) {
            return Err(LedgerError::invalid_input(
                "splits",
                format!("member {} appears in more than one split", split.member_id),
            ));
        }
        if split.amount < Decimal::ZERO || !is_representable(split.amount) {
            return Err(LedgerError::InvalidAmount(format!(
                "split amount {}",
                split.amount
            )));
        }
        if split.settled {
            return Err(LedgerError::invalid_input(
                "splits",
                "new splits must start unsettled",
            ));
        }
    }

    Ok(())
}

/// References an expense needs, in the order they are checked
pub(crate) fn expense_references(
    expense: &Expense,
    splits: &[GroupExpenseSplit],
) -> Vec<(EntityKind, String)> {
    let mut refs = vec![
        (EntityKind::User, expense.payer_id.clone()),
        (EntityKind::Category, expense.category_id.clone()),
    ];
    if let Some(group_id) = &expense.group_id {
        refs.push((EntityKind::Group, group_id.clone()));
    }
    refs.extend(
        splits
            .iter()
            .map(|split| (EntityKind::User, split.member_id.clone())),
    );
    refs
}

// ============================================================================
// CONTRACT TESTS (run against every implementation)
// ============================================================================

#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::entities::NotificationType;
    use crate::testing::{seed_store, Seeded};
    use rust_decimal_macros::dec;

    fn group_expense(seed: &Seeded, amount: Decimal) -> Expense {
        Expense::new(
            amount,
            "Groceries run".to_string(),
            seed.category.id.clone(),
            seed.payer.id.clone(),
            Some(seed.group.id.clone()),
            "USD".to_string(),
        )
    }

    fn splits_for(expense: &Expense, seed: &Seeded) -> Vec<GroupExpenseSplit> {
        vec![
            GroupExpenseSplit::new(expense.id.clone(), seed.alice.id.clone(), dec!(10.00)),
            GroupExpenseSplit::new(expense.id.clone(), seed.bob.id.clone(), dec!(10.00)),
        ]
    }

    pub fn records_and_lists(store: &dyn LedgerStore) {
        let seed = seed_store(store);
        let expense = group_expense(&seed, dec!(30.00));
        let splits = splits_for(&expense, &seed);

        let saved = store.record_expense(&expense, &splits).unwrap();
        assert_eq!(saved, expense);

        assert_eq!(store.get_expense(&expense.id).unwrap(), Some(expense.clone()));
        assert_eq!(store.list_splits_for_expense(&expense.id).unwrap(), splits);

        let alice_owes = store.list_splits_owed_by(&seed.alice.id).unwrap();
        assert_eq!(alice_owes, vec![splits[0].clone()]);
        assert!(store.list_splits_owed_by(&seed.payer.id).unwrap().is_empty());
        assert!(store.exists(EntityKind::Expense, &expense.id).unwrap());
        assert!(store.exists(EntityKind::Split, &splits[1].id).unwrap());
    }

    pub fn personal_expense_has_no_splits(store: &dyn LedgerStore) {
        let seed = seed_store(store);
        let mut expense = group_expense(&seed, dec!(12.00));
        expense.group_id = None;

        store.record_expense(&expense, &[]).unwrap();
        assert!(store.list_splits_for_expense(&expense.id).unwrap().is_empty());

        let mut other = group_expense(&seed, dec!(12.00));
        other.group_id = None;
        let stray = GroupExpenseSplit::new(other.id.clone(), seed.alice.id.clone(), dec!(6.00));
        let result = store.record_expense(&other, &[stray]);
        assert!(matches!(result, Err(LedgerError::InvalidInput { .. })));
        assert_eq!(store.get_expense(&other.id).unwrap(), None);
    }

    pub fn malformed_expense_writes_nothing(store: &dyn LedgerStore) {
        let seed = seed_store(store);

        for amount in [dec!(0), dec!(-30.00), dec!(30.005)] {
            let expense = group_expense(&seed, amount);
            let splits = splits_for(&expense, &seed);
            let result = store.record_expense(&expense, &splits);
            assert!(matches!(result, Err(LedgerError::InvalidAmount(_))), "{}", amount);
            assert_eq!(store.get_expense(&expense.id).unwrap(), None);
        }

        let mut blank = group_expense(&seed, dec!(30.00));
        blank.description = "   ".to_string();
        let splits = splits_for(&blank, &seed);
        assert!(matches!(
            store.record_expense(&blank, &splits),
            Err(LedgerError::InvalidInput { field: "description", .. })
        ));

        let unsplit = group_expense(&seed, dec!(30.00));
        assert!(matches!(
            store.record_expense(&unsplit, &[]),
            Err(LedgerError::InvalidInput { field: "splits", .. })
        ));
        assert_eq!(store.get_expense(&unsplit.id).unwrap(), None);
    }

    pub fn missing_reference_writes_nothing(store: &dyn LedgerStore) {
        let seed = seed_store(store);
        let mut expense = group_expense(&seed, dec!(30.00));
        expense.category_id = "no-such-category".to_string();
        let splits = splits_for(&expense, &seed);

        let result = store.record_expense(&expense, &splits);

        assert!(matches!(
            result,
            Err(LedgerError::ReferenceNotFound { kind: EntityKind::Category, .. })
        ));
        assert_eq!(store.get_expense(&expense.id).unwrap(), None);
        assert!(store.list_splits_for_expense(&expense.id).unwrap().is_empty());
    }

    /// Second split row collides with the first after the expense row and
    /// one split are already written; nothing may remain visible.
    pub fn interrupted_write_is_all_or_nothing(store: &dyn LedgerStore) {
        let seed = seed_store(store);
        let expense = group_expense(&seed, dec!(30.00));
        let mut splits = splits_for(&expense, &seed);
        splits[1].id = splits[0].id.clone();

        let result = store.record_expense(&expense, &splits);

        assert!(result.is_err());
        assert_eq!(store.get_expense(&expense.id).unwrap(), None);
        assert!(store.list_splits_for_expense(&expense.id).unwrap().is_empty());
        assert!(store.list_splits_owed_by(&seed.alice.id).unwrap().is_empty());
    }

    pub fn settles_once(store: &dyn LedgerStore) {
        let seed = seed_store(store);
        let expense = group_expense(&seed, dec!(30.00));
        let splits = splits_for(&expense, &seed);
        store.record_expense(&expense, &splits).unwrap();

        let first_at = Utc::now();
        let first = store.mark_split_settled(&splits[0].id, first_at).unwrap();
        let settled = match first {
            SettleWrite::Settled(split) => split,
            other => panic!("expected first settlement, got {:?}", other),
        };
        assert!(settled.settled);
        assert_eq!(settled.settled_at, Some(first_at));

        let second = store
            .mark_split_settled(&splits[0].id, first_at + chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(second, SettleWrite::AlreadySettled(settled.clone()));

        let untouched = store.get_split(&splits[1].id).unwrap().unwrap();
        assert!(!untouched.settled);
        assert!(untouched.settled_at.is_none());

        let missing = store.mark_split_settled("no-such-split", Utc::now());
        assert!(matches!(
            missing,
            Err(LedgerError::ReferenceNotFound { kind: EntityKind::Split, .. })
        ));
    }

    pub fn notifications_inbox(store: &dyn LedgerStore) {
        let seed = seed_store(store);
        let older = Notification::new(
            seed.alice.id.clone(),
            NotificationType::ExpenseAdded,
            "New group expense".to_string(),
            "first".to_string(),
        );
        let newer = Notification::new(
            seed.alice.id.clone(),
            NotificationType::PaymentReminder,
            "Payment reminder".to_string(),
            "second".to_string(),
        );
        store.insert_notification(&older).unwrap();
        store.insert_notification(&newer).unwrap();
        assert_eq!(store.get_notification(&newer.id).unwrap(), Some(newer.clone()));
        assert_eq!(store.get_notification("missing").unwrap(), None);

        let inbox = store.list_notifications(&seed.alice.id, false).unwrap();
        let messages: Vec<&str> = inbox.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);

        let read = store.mark_notification_read(&older.id).unwrap();
        assert!(read.read);
        let again = store.mark_notification_read(&older.id).unwrap();
        assert_eq!(again, read);

        let unread = store.list_notifications(&seed.alice.id, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, newer.id);
        assert!(store.list_notifications(&seed.bob.id, false).unwrap().is_empty());

        assert!(matches!(
            store.mark_notification_read("missing"),
            Err(LedgerError::ReferenceNotFound { kind: EntityKind::Notification, .. })
        ));

        let orphan = Notification::new(
            "departed-user".to_string(),
            NotificationType::PaymentReminder,
            "Payment reminder".to_string(),
            "nobody reads this".to_string(),
        );
        let result = store.insert_notification(&orphan);
        assert!(matches!(
            result,
            Err(LedgerError::ReferenceNotFound { kind: EntityKind::User, .. })
        ));
        assert_eq!(store.get_notification(&orphan.id).unwrap(), None);
    }

    pub fn membership_requires_known_user(store: &dyn LedgerStore) {
        let seed = seed_store(store);

        let members = store.list_group_members(&seed.group.id).unwrap();
        let ids: HashSet<&str> = members.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(seed.payer.id.as_str()));

        let ghost = GroupMember::new(
            seed.group.id.clone(),
            "ghost-user".to_string(),
            crate::entities::MemberRole::Member,
        );
        assert!(matches!(
            store.add_group_member(&ghost),
            Err(LedgerError::ReferenceNotFound { kind: EntityKind::User, .. })
        ));
    }
}
