// 🗄️ SQLite Ledger Store - production persistence
//
// - WAL mode for crash recovery, foreign keys enforced
// - Amounts stored as decimal TEXT (exact), timestamps as RFC 3339 TEXT
// - One Mutex<Connection> shared by all requests
// - record_expense = one SQLite transaction (rollback on any error)

use super::{expense_references, validate_expense_rows, LedgerStore, SettleWrite};
use crate::entities::{
    Category, Expense, Group, GroupExpenseSplit, GroupMember, MemberRole, Notification,
    NotificationType, User,
};
use crate::error::{EntityKind, LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const EXPENSE_COLUMNS: &str =
    "id, amount, description, category_id, payer_id, group_id, currency, created_at";
const SPLIT_COLUMNS: &str = "id, expense_id, member_id, amount, settled, settled_at";
const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, notification_type, title, message, is_read, created_at";

pub fn setup_database(conn: &Connection) -> LedgerResult<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Reference tables (owned by external collaborators, read by the ledger)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_groups (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            created_by TEXT NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_members (
            group_id TEXT NOT NULL REFERENCES expense_groups(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            role TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Ledger tables (expenses append-only, splits settle once)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL,
            category_id TEXT NOT NULL REFERENCES categories(id),
            payer_id TEXT NOT NULL REFERENCES users(id),
            group_id TEXT REFERENCES expense_groups(id),
            currency TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_expense_splits (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            expense_id TEXT NOT NULL REFERENCES expenses(id),
            member_id TEXT NOT NULL REFERENCES users(id),
            amount TEXT NOT NULL,
            settled INTEGER NOT NULL DEFAULT 0,
            settled_at TEXT,
            UNIQUE (expense_id, member_id)
        )",
        [],
    )?;

    // Settled is terminal: no update may touch a settled row
    conn.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS splits_settle_once
         BEFORE UPDATE ON group_expense_splits
         WHEN OLD.settled = 1
         BEGIN
             SELECT RAISE(ABORT, 'settled splits are immutable');
         END;",
    )?;

    // ==========================================================================
    // Notifications (durable delivery path)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            recipient_id TEXT NOT NULL REFERENCES users(id),
            notification_type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_splits_member ON group_expense_splits(member_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_splits_expense ON group_expense_splits(expense_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_group ON expenses(group_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(_) => timestamp_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn row_to_expense(row: &Row) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        amount: decimal_column(row, 1)?,
        description: row.get(2)?,
        category_id: row.get(3)?,
        payer_id: row.get(4)?,
        group_id: row.get(5)?,
        currency: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

fn row_to_split(row: &Row) -> rusqlite::Result<GroupExpenseSplit> {
    Ok(GroupExpenseSplit {
        id: row.get(0)?,
        expense_id: row.get(1)?,
        member_id: row.get(2)?,
        amount: decimal_column(row, 3)?,
        settled: row.get(4)?,
        settled_at: optional_timestamp_column(row, 5)?,
    })
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind: String = row.get(2)?;
    let notification_type = NotificationType::parse(&kind)
        .ok_or_else(|| conversion_error(2, format!("unknown notification type '{}'", kind)))?;

    Ok(Notification {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        notification_type,
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
    })
}

fn row_to_member(row: &Row) -> rusqlite::Result<GroupMember> {
    let role: String = row.get(2)?;
    let role = MemberRole::parse(&role)
        .ok_or_else(|| conversion_error(2, format!("unknown member role '{}'", role)))?;

    Ok(GroupMember {
        group_id: row.get(0)?,
        user_id: row.get(1)?,
        role,
        joined_at: timestamp_column(row, 3)?,
    })
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "users",
        EntityKind::Category => "categories",
        EntityKind::Group => "expense_groups",
        EntityKind::Expense => "expenses",
        EntityKind::Split => "group_expense_splits",
        EntityKind::Notification => "notifications",
    }
}

fn exists_in(conn: &Connection, kind: EntityKind, id: &str) -> LedgerResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table_for(kind));
    let found: bool = conn.query_row(&sql, [id], |row| row.get(0))?;
    Ok(found)
}

fn require(conn: &Connection, kind: EntityKind, id: &str) -> LedgerResult<()> {
    if exists_in(conn, kind, id)? {
        Ok(())
    } else {
        Err(LedgerError::reference(kind, id))
    }
}

fn query_split(conn: &Connection, id: &str) -> LedgerResult<Option<GroupExpenseSplit>> {
    let sql = format!("SELECT {} FROM group_expense_splits WHERE id = ?1", SPLIT_COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_split).optional()?)
}

fn query_notification(conn: &Connection, id: &str) -> LedgerResult<Option<Notification>> {
    let sql = format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_notification).optional()?)
}

// ============================================================================
// SQLITE LEDGER STORE
// ============================================================================

pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened ledger database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, creating the schema if needed
    pub fn from_connection(conn: Connection) -> LedgerResult<Self> {
        setup_database(&conn)?;
        Ok(SqliteLedgerStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Storage("database connection lock poisoned".to_string()))
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn register_user(&self, user: &User) -> LedgerResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.name, user.email, user.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn register_category(&self, category: &Category) -> LedgerResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![category.id, category.name, category.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn register_group(&self, group: &Group) -> LedgerResult<()> {
        let conn = self.conn()?;
        require(&conn, EntityKind::User, &group.created_by)?;
        conn.execute(
            "INSERT INTO expense_groups (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                group.id,
                group.name,
                group.created_by,
                group.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn add_group_member(&self, member: &GroupMember) -> LedgerResult<()> {
        let conn = self.conn()?;
        require(&conn, EntityKind::Group, &member.group_id)?;
        require(&conn, EntityKind::User, &member.user_id)?;
        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                member.group_id,
                member.user_id,
                member.role.as_str(),
                member.joined_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn exists(&self, kind: EntityKind, id: &str) -> LedgerResult<bool> {
        let conn = self.conn()?;
        exists_in(&conn, kind, id)
    }

    fn get_user(&self, id: &str) -> LedgerResult<Option<User>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                [id],
                row_to_user,
            )
            .optional()?)
    }

    fn list_users(&self) -> LedgerResult<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, email, created_at FROM users ORDER BY seq")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn list_group_members(&self, group_id: &str) -> LedgerResult<Vec<GroupMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT group_id, user_id, role, joined_at
             FROM group_members
             WHERE group_id = ?1
             ORDER BY joined_at, user_id",
        )?;
        let members = stmt
            .query_map([group_id], row_to_member)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn record_expense(
        &self,
        expense: &Expense,
        splits: &[GroupExpenseSplit],
    ) -> LedgerResult<Expense> {
        validate_expense_rows(expense, splits)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for (kind, id) in expense_references(expense, splits) {
            require(&tx, kind, &id)?;
        }

        tx.execute(
            "INSERT INTO expenses (
                id, amount, description, category_id, payer_id, group_id, currency, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                expense.id,
                expense.amount.to_string(),
                expense.description,
                expense.category_id,
                expense.payer_id,
                expense.group_id,
                expense.currency,
                expense.created_at.to_rfc3339(),
            ],
        )?;

        for split in splits {
            tx.execute(
                "INSERT INTO group_expense_splits (
                    id, expense_id, member_id, amount, settled, settled_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    split.id,
                    split.expense_id,
                    split.member_id,
                    split.amount.to_string(),
                    split.settled,
                    split.settled_at.map(|dt| dt.to_rfc3339()),
                ],
            )?;
        }

        // Dropping `tx` on any error above rolls everything back
        tx.commit()?;

        info!(
            expense_id = %expense.id,
            amount = %expense.amount,
            splits = splits.len(),
            "Expense recorded"
        );
        Ok(expense.clone())
    }

    fn get_expense(&self, id: &str) -> LedgerResult<Option<Expense>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM expenses WHERE id = ?1", EXPENSE_COLUMNS);
        Ok(conn.query_row(&sql, [id], row_to_expense).optional()?)
    }

    fn get_split(&self, id: &str) -> LedgerResult<Option<GroupExpenseSplit>> {
        let conn = self.conn()?;
        query_split(&conn, id)
    }

    fn list_splits_owed_by(&self, user_id: &str) -> LedgerResult<Vec<GroupExpenseSplit>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM group_expense_splits WHERE member_id = ?1 ORDER BY seq",
            SPLIT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let splits = stmt
            .query_map([user_id], row_to_split)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(splits)
    }

    fn list_splits_for_expense(&self, expense_id: &str) -> LedgerResult<Vec<GroupExpenseSplit>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM group_expense_splits WHERE expense_id = ?1 ORDER BY seq",
            SPLIT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let splits = stmt
            .query_map([expense_id], row_to_split)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(splits)
    }

    fn mark_split_settled(&self, split_id: &str, at: DateTime<Utc>) -> LedgerResult<SettleWrite> {
        let conn = self.conn()?;

        // First committer wins; later callers match zero rows
        let changed = conn.execute(
            "UPDATE group_expense_splits
             SET settled = 1, settled_at = ?1
             WHERE id = ?2 AND settled = 0",
            params![at.to_rfc3339(), split_id],
        )?;

        let split = query_split(&conn, split_id)?
            .ok_or_else(|| LedgerError::reference(EntityKind::Split, split_id))?;

        if changed == 1 {
            Ok(SettleWrite::Settled(split))
        } else {
            debug!(split_id = split_id, "Split already settled");
            Ok(SettleWrite::AlreadySettled(split))
        }
    }

    fn insert_notification(&self, notification: &Notification) -> LedgerResult<()> {
        let conn = self.conn()?;
        require(&conn, EntityKind::User, &notification.recipient_id)?;
        conn.execute(
            "INSERT INTO notifications (
                id, recipient_id, notification_type, title, message, is_read, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                notification.id,
                notification.recipient_id,
                notification.notification_type.as_str(),
                notification.title,
                notification.message,
                notification.read,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_notification(&self, id: &str) -> LedgerResult<Option<Notification>> {
        let conn = self.conn()?;
        query_notification(&conn, id)
    }

    fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> LedgerResult<Vec<Notification>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM notifications
             WHERE recipient_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY seq DESC",
            NOTIFICATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let notifications = stmt
            .query_map(params![recipient_id, unread_only], row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    fn mark_notification_read(&self, id: &str) -> LedgerResult<Notification> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0",
            [id],
        )?;
        query_notification(&conn, id)?
            .ok_or_else(|| LedgerError::reference(EntityKind::Notification, id))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use crate::testing::seed_store;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    fn store() -> SqliteLedgerStore {
        SqliteLedgerStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_records_and_lists() {
        contract::records_and_lists(&store());
    }

    #[test]
    fn test_personal_expense_has_no_splits() {
        contract::personal_expense_has_no_splits(&store());
    }

    #[test]
    fn test_malformed_expense_writes_nothing() {
        contract::malformed_expense_writes_nothing(&store());
    }

    #[test]
    fn test_missing_reference_writes_nothing() {
        contract::missing_reference_writes_nothing(&store());
    }

    #[test]
    fn test_interrupted_write_rolls_back() {
        contract::interrupted_write_is_all_or_nothing(&store());
    }

    #[test]
    fn test_settles_once() {
        contract::settles_once(&store());
    }

    #[test]
    fn test_notifications_inbox() {
        contract::notifications_inbox(&store());
    }

    #[test]
    fn test_membership_requires_known_user() {
        contract::membership_requires_known_user(&store());
    }

    #[test]
    fn test_racing_settles_have_one_winner() {
        let store = Arc::new(store());
        let seed = seed_store(store.as_ref());
        let expense = Expense::new(
            dec!(30.00),
            "Dinner".to_string(),
            seed.category.id.clone(),
            seed.payer.id.clone(),
            Some(seed.group.id.clone()),
            "USD".to_string(),
        );
        let split = GroupExpenseSplit::new(expense.id.clone(), seed.alice.id.clone(), dec!(10.00));
        store.record_expense(&expense, &[split.clone()]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let split_id = split.id.clone();
                thread::spawn(move || store.mark_split_settled(&split_id, Utc::now()).unwrap())
            })
            .collect();
        let writes: Vec<SettleWrite> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = writes
            .iter()
            .filter(|w| matches!(w, SettleWrite::Settled(_)))
            .count();
        assert_eq!(winners, 1);

        let stored = store.get_split(&split.id).unwrap().unwrap();
        for write in &writes {
            assert_eq!(write.split().settled_at, stored.settled_at);
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_amounts_survive_exactly() {
        let store = store();
        let seed = seed_store(&store);
        let expense = Expense::new(
            dec!(0.10),
            "Gum".to_string(),
            seed.category.id.clone(),
            seed.payer.id.clone(),
            Some(seed.group.id.clone()),
            "USD".to_string(),
        );
        let split = GroupExpenseSplit::new(expense.id.clone(), seed.alice.id.clone(), dec!(0.03));
        store.record_expense(&expense, &[split]).unwrap();

        let loaded = store.get_expense(&expense.id).unwrap().unwrap();
        assert_eq!(loaded.amount.to_string(), "0.10");
        let splits = store.list_splits_for_expense(&expense.id).unwrap();
        assert_eq!(splits[0].amount.to_string(), "0.03");
        assert_eq!(loaded.created_at, expense.created_at);
    }

    #[test]
    fn test_trigger_blocks_unsettling() {
        let store = store();
        let seed = seed_store(&store);
        let expense = Expense::new(
            dec!(20.00),
            "Taxi".to_string(),
            seed.category.id.clone(),
            seed.payer.id.clone(),
            Some(seed.group.id.clone()),
            "USD".to_string(),
        );
        let split = GroupExpenseSplit::new(expense.id.clone(), seed.alice.id.clone(), dec!(10.00));
        store.record_expense(&expense, &[split.clone()]).unwrap();
        store.mark_split_settled(&split.id, Utc::now()).unwrap();

        let conn = store.conn().unwrap();
        let result = conn.execute(
            "UPDATE group_expense_splits SET settled = 0, settled_at = NULL WHERE id = ?1",
            [&split.id],
        );
        assert!(result.is_err());
        drop(conn);

        assert!(store.get_split(&split.id).unwrap().unwrap().settled);
    }
}
