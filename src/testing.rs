// Shared fixtures for unit tests

use crate::broadcast::{DeliveryError, Listener};
use crate::entities::{Category, Group, GroupMember, MemberRole, User};
use crate::store::LedgerStore;
use std::sync::Mutex;

/// Three users in one group; `payer` created it
pub(crate) struct Seeded {
    pub payer: User,
    pub alice: User,
    pub bob: User,
    pub category: Category,
    pub group: Group,
}

pub(crate) fn seed_store(store: &dyn LedgerStore) -> Seeded {
    let payer = User::new("Pat".to_string(), Some("pat@example.com".to_string()));
    let alice = User::new("Alice".to_string(), Some("alice@example.com".to_string()));
    let bob = User::new("Bob".to_string(), None);
    for user in [&payer, &alice, &bob] {
        store.register_user(user).unwrap();
    }

    let category = Category::new("Food & Dining".to_string());
    store.register_category(&category).unwrap();

    let group = Group::new("Flatmates".to_string(), payer.id.clone());
    store.register_group(&group).unwrap();
    let admin = GroupMember::new(group.id.clone(), payer.id.clone(), MemberRole::Admin);
    store.add_group_member(&admin).unwrap();
    for user in [&alice, &bob] {
        let member = GroupMember::new(group.id.clone(), user.id.clone(), MemberRole::Member);
        store.add_group_member(&member).unwrap();
    }

    Seeded {
        payer,
        alice,
        bob,
        category,
        group,
    }
}

/// Listener that keeps every payload it receives
#[derive(Default)]
pub(crate) struct RecordingListener {
    received: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|payload| serde_json::from_str(payload).unwrap())
            .collect()
    }
}

impl Listener for RecordingListener {
    fn send(&self, payload: &str) -> Result<(), DeliveryError> {
        self.received.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

/// Listener whose connection is already gone
pub(crate) struct ClosedListener;

impl Listener for ClosedListener {
    fn send(&self, _payload: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Disconnected)
    }
}
