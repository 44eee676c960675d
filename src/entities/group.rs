// 👥 Reference entities - users, categories, groups, memberships
//
// CRUD for these lives outside the ledger core. The core only registers
// and reads them so that expense references can be checked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// USER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: Option<String>) -> Self {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    /// e.g. "Groceries", "Rent"
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: String) -> Self {
        Category {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// GROUP + MEMBERSHIP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: String, created_by: String) -> Self {
        Group {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            created_by,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(MemberRole::Admin),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl GroupMember {
    pub fn new(group_id: String, user_id: String, role: MemberRole) -> Self {
        GroupMember {
            group_id,
            user_id,
            role,
            joined_at: Utc::now(),
        }
    }
}
