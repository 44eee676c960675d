// Group Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod app;
pub mod broadcast;     // Live fan-out of ledger events
pub mod config;
pub mod entities;
pub mod error;
pub mod expenses;
pub mod identity;      // UUID ↔ stable integer ids
pub mod money;
pub mod notifications; // Durable inbox + Notifier
pub mod settlement;
pub mod split;
pub mod store;
pub mod views;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use app::LedgerApp;
pub use broadcast::{BroadcastChannel, DeliveryError, LedgerEvent, Listener, ListenerId};
pub use config::{init_tracing, AppConfig};
pub use entities::{
    Category, Expense, Group, GroupExpenseSplit, GroupMember, MemberRole, Notification,
    NotificationType, SplitState, User,
};
pub use error::{EntityKind, ErrorKind, LedgerError, LedgerResult};
pub use expenses::{ExpenseService, NewExpense, RecordedExpense};
pub use identity::{IdentityMap, StableId};
pub use notifications::{Delivery, Notifier};
pub use settlement::{SettlementCoordinator, SettlementOutcome};
pub use split::{CustomShare, SplitEngine, SplitPolicy, SplitShare};
pub use store::{setup_database, LedgerStore, MemoryLedgerStore, SettleWrite, SqliteLedgerStore};
pub use views::{ExpenseView, MemberView, NotificationView, SplitView, UserView};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
