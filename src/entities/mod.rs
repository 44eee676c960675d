// Entity Models
//
// Each entity has:
// - Stable store identity (UUID) that NEVER changes
// - Immutable values, except the single transitions documented per entity

pub mod expense;
pub mod group;
pub mod notification;

pub use expense::{Expense, GroupExpenseSplit, SplitState};
pub use group::{Category, Group, GroupMember, MemberRole, User};
pub use notification::{Notification, NotificationType};
