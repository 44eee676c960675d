// 🔢 Identity Mapping - opaque store keys ↔ small stable integers
//
// Store keys are UUID strings. Clients only ever see StableIds.
// One table for every entity kind: UUIDs never collide across kinds.
//
// The table lives for the process lifetime; it is not persisted.
// Allocation of a new id happens under the table lock, so two
// concurrent first-sightings of different keys never share an id and
// two first-sightings of the same key agree on one.

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(pub u64);

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct IdentityTable {
    by_key: HashMap<String, StableId>,
    by_id: HashMap<StableId, String>,
    last: u64,
}

/// Bidirectional map between native store keys and stable ids
///
/// Shared by reference (`Arc<IdentityMap>`) with every component that
/// talks to clients.
#[derive(Default)]
pub struct IdentityMap {
    table: Mutex<IdentityTable>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, IdentityTable> {
        // The table is never left half-updated, so a poisoned lock is still usable.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stable id for a native key, allocating the next one on first sight
    pub fn to_stable_id(&self, native_key: &str) -> StableId {
        let mut table = self.table();

        if let Some(id) = table.by_key.get(native_key) {
            return *id;
        }

        table.last += 1;
        let id = StableId(table.last);
        table.by_key.insert(native_key.to_string(), id);
        table.by_id.insert(id, native_key.to_string());
        id
    }

    /// Native key for a stable id; unknown ids mean the entity does not exist
    pub fn to_native_key(&self, id: StableId) -> LedgerResult<String> {
        self.table()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.table().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_same_key_same_id() {
        let ids = IdentityMap::new();

        let first = ids.to_stable_id("0f8c6a4e-expense");
        let again = ids.to_stable_id("0f8c6a4e-expense");

        assert_eq!(first, again);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_round_trip_for_seen_keys() {
        let ids = IdentityMap::new();
        let keys = ["user-a", "user-b", "group-g", "category-c"];

        let stable: Vec<StableId> = keys.iter().map(|k| ids.to_stable_id(k)).collect();

        for (key, id) in keys.iter().zip(&stable) {
            assert_eq!(ids.to_native_key(*id).unwrap(), *key);
        }
        let distinct: HashSet<_> = stable.iter().collect();
        assert_eq!(distinct.len(), keys.len());
    }

    #[test]
    fn test_ids_are_monotonic() {
        let ids = IdentityMap::new();

        assert_eq!(ids.to_stable_id("a"), StableId(1));
        assert_eq!(ids.to_stable_id("b"), StableId(2));
        assert_eq!(ids.to_stable_id("a"), StableId(1));
        assert_eq!(ids.to_stable_id("c"), StableId(3));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let ids = IdentityMap::new();
        ids.to_stable_id("only-key");

        let result = ids.to_native_key(StableId(99));

        assert!(matches!(result, Err(LedgerError::NotFound(StableId(99)))));
    }

    #[test]
    fn test_concurrent_allocation_never_collides() {
        let ids = Arc::new(IdentityMap::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || {
                    // Half the keys are shared between all workers
                    (0..200)
                        .map(|n| {
                            let key = if n % 2 == 0 {
                                format!("shared-{}", n)
                            } else {
                                format!("worker-{}-{}", worker, n)
                            };
                            (key.clone(), ids.to_stable_id(&key))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: HashMap<String, StableId> = HashMap::new();
        for handle in handles {
            for (key, id) in handle.join().unwrap() {
                let existing = seen.entry(key).or_insert(id);
                assert_eq!(*existing, id, "same key must map to one id");
            }
        }

        let distinct: HashSet<_> = seen.values().collect();
        assert_eq!(distinct.len(), seen.len(), "different keys must map to different ids");
        assert_eq!(ids.len(), seen.len());
        assert_eq!(seen.len(), 100 + 8 * 100);
    }
}
