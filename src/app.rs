// 🧩 Ledger App - one place that wires the components together
//
// Store, identity map and broadcast channel are created once and shared
// by reference with every service.

use crate::broadcast::BroadcastChannel;
use crate::config::AppConfig;
use crate::entities::{Category, Group, GroupMember, MemberRole, User};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use crate::expenses::ExpenseService;
use crate::identity::{IdentityMap, StableId};
use crate::notifications::Notifier;
use crate::settlement::SettlementCoordinator;
use crate::split::SplitEngine;
use crate::store::{LedgerStore, SqliteLedgerStore};
use crate::views::{MemberView, UserView};
use std::sync::Arc;
use tracing::info;

pub struct LedgerApp {
    pub store: Arc<dyn LedgerStore>,
    pub ids: Arc<IdentityMap>,
    pub channel: Arc<BroadcastChannel>,
    pub notifier: Arc<Notifier>,
    pub expenses: ExpenseService,
    pub settlement: SettlementCoordinator,
}

impl LedgerApp {
    pub fn new(store: Arc<dyn LedgerStore>, engine: SplitEngine) -> Self {
        let ids = Arc::new(IdentityMap::new());
        let channel = Arc::new(BroadcastChannel::new());
        let notifier = Arc::new(Notifier::new(store.clone(), ids.clone(), channel.clone()));
        let expenses = ExpenseService::new(store.clone(), ids.clone(), engine, notifier.clone());
        let settlement = SettlementCoordinator::new(store.clone(), ids.clone(), notifier.clone());

        LedgerApp {
            store,
            ids,
            channel,
            notifier,
            expenses,
            settlement,
        }
    }

    /// Open the SQLite database named by the config
    pub fn open(config: &AppConfig) -> LedgerResult<Self> {
        let store = SqliteLedgerStore::open(&config.database_path)?;
        let app = Self::new(
            Arc::new(store),
            SplitEngine::with_tolerance(config.split_tolerance),
        );
        let users = app.users()?;
        info!(
            path = %config.database_path.display(),
            users = users.len(),
            "Ledger opened"
        );
        Ok(app)
    }

    /// All users; also hands out their stable ids in registration order
    pub fn users(&self) -> LedgerResult<Vec<UserView>> {
        Ok(self
            .store
            .list_users()?
            .iter()
            .map(|user| UserView::new(user, &self.ids))
            .collect())
    }

    pub fn group_members(&self, group: StableId) -> LedgerResult<Vec<MemberView>> {
        let key = self.ids.to_native_key(group)?;
        if !self.store.exists(EntityKind::Group, &key)? {
            return Err(LedgerError::reference(EntityKind::Group, key));
        }
        Ok(self
            .store
            .list_group_members(&key)?
            .iter()
            .map(|member| MemberView::new(member, &self.ids))
            .collect())
    }

    pub fn register_user(&self, name: &str, email: Option<&str>) -> LedgerResult<StableId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid_input("name", "must not be empty"));
        }
        let user = User::new(name.to_string(), email.map(str::to_string));
        self.store.register_user(&user)?;
        Ok(self.ids.to_stable_id(&user.id))
    }

    pub fn register_category(&self, name: &str) -> LedgerResult<StableId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid_input("name", "must not be empty"));
        }
        let category = Category::new(name.to_string());
        self.store.register_category(&category)?;
        Ok(self.ids.to_stable_id(&category.id))
    }

    /// New group; the creator joins as admin
    pub fn create_group(&self, name: &str, created_by: StableId) -> LedgerResult<StableId> {
        let creator = self.ids.to_native_key(created_by)?;
        let group = Group::new(name.trim().to_string(), creator.clone());
        self.store.register_group(&group)?;
        self.store
            .add_group_member(&GroupMember::new(group.id.clone(), creator, MemberRole::Admin))?;
        Ok(self.ids.to_stable_id(&group.id))
    }

    pub fn add_member(&self, group: StableId, user: StableId) -> LedgerResult<()> {
        let group_key = self.ids.to_native_key(group)?;
        let user_key = self.ids.to_native_key(user)?;
        self.store
            .add_group_member(&GroupMember::new(group_key, user_key, MemberRole::Member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expenses::NewExpense;
    use crate::split::SplitPolicy;
    use crate::store::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wired_app_runs_a_group_expense() {
        let app = LedgerApp::new(Arc::new(MemoryLedgerStore::new()), SplitEngine::new());
        let pat = app.register_user("Pat", None).unwrap();
        let alice = app.register_user("Alice", Some("alice@example.com")).unwrap();
        let food = app.register_category("Food").unwrap();
        let group = app.create_group("Trip", pat).unwrap();
        app.add_member(group, alice).unwrap();

        let members = app.group_members(group).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, MemberRole::Admin);

        let recorded = app
            .expenses
            .create_expense(
                pat,
                NewExpense {
                    amount: dec!(25.00),
                    description: "Fuel".to_string(),
                    category_id: food,
                    group_id: Some(group),
                    currency: "EUR".to_string(),
                    split: SplitPolicy::Equal,
                },
            )
            .unwrap();

        assert_eq!(recorded.splits.len(), 1);
        assert_eq!(recorded.splits[0].member_id, alice);
        assert_eq!(recorded.splits[0].amount, dec!(12.50));
        assert_eq!(app.notifier.list_notifications(alice, true).unwrap().len(), 1);
    }

    #[test]
    fn test_users_are_listed_with_stable_ids() {
        let app = LedgerApp::new(Arc::new(MemoryLedgerStore::new()), SplitEngine::new());
        let pat = app.register_user("Pat", None).unwrap();

        let users = app.users().unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, pat);
        assert!(matches!(
            app.register_user("   ", None),
            Err(LedgerError::InvalidInput { field: "name", .. })
        ));
    }

    #[test]
    fn test_unknown_group_members() {
        let app = LedgerApp::new(Arc::new(MemoryLedgerStore::new()), SplitEngine::new());
        assert!(matches!(
            app.group_members(StableId(42)),
            Err(LedgerError::NotFound(StableId(42)))
        ));
    }
}
