use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;

use group_ledger::money::parse_amount;
use group_ledger::{
    init_tracing, setup_database, AppConfig, DeliveryError, LedgerApp, Listener, NewExpense,
    SplitEngine, SplitPolicy, SqliteLedgerStore, StableId,
};

fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config)?;

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&config),
        Some("demo") => run_demo(&config),
        Some(other) => {
            eprintln!("❌ Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
        None => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Group Ledger v{}", group_ledger::VERSION);
    println!();
    println!("Usage:");
    println!("  group-ledger init   Create the database schema at LEDGER_DB_PATH");
    println!("  group-ledger demo   Run a dinner-split walkthrough on an in-memory ledger");
}

fn run_init(config: &AppConfig) -> Result<()> {
    println!("🗄️  Group Ledger - Database Setup");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = rusqlite::Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    setup_database(&conn).context("Failed to create schema")?;

    println!("✓ Schema ready at {}", config.database_path.display());
    println!("✓ WAL mode enabled, foreign keys on");
    Ok(())
}

/// Prints every broadcast event as it happens
struct ConsoleListener;

impl Listener for ConsoleListener {
    fn send(&self, payload: &str) -> Result<(), DeliveryError> {
        println!("   📡 {}", payload);
        Ok(())
    }
}

fn run_demo(config: &AppConfig) -> Result<()> {
    println!("🍽️  Group Ledger - Demo");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = SqliteLedgerStore::open_in_memory().context("Failed to open in-memory ledger")?;
    let app = LedgerApp::new(
        Arc::new(store),
        SplitEngine::with_tolerance(config.split_tolerance),
    );
    app.channel.connect(Arc::new(ConsoleListener));

    // 1. Reference data
    println!("\n👥 Seeding users and group...");
    let pat = app.register_user("Pat", Some("pat@example.com"))?;
    let alice = app.register_user("Alice", Some("alice@example.com"))?;
    let bob = app.register_user("Bob", None)?;
    let food = app.register_category("Food & Dining")?;
    let group = app.create_group("Flatmates", pat)?;
    app.add_member(group, alice)?;
    app.add_member(group, bob)?;
    println!("✓ Pat ({}), Alice ({}), Bob ({}) in group {}", pat, alice, bob, group);

    // 2. Equal split
    println!("\n💸 Pat pays 30.00 USD for dinner...");
    let dinner = app.expenses.create_expense(
        pat,
        NewExpense {
            amount: parse_amount("30.00")?,
            description: "Dinner".to_string(),
            category_id: food,
            group_id: Some(group),
            currency: "USD".to_string(),
            split: SplitPolicy::Equal,
        },
    )?;
    for split in &dinner.splits {
        println!("   member {} owes {} (split {})", split.member_id, split.amount, split.id);
    }

    // 3. Settlement, twice
    let alice_split = split_of(&dinner.splits, alice)?;
    println!("\n✅ Alice settles split {}...", alice_split);
    let first = app.settlement.settle(alice, alice_split)?;
    println!("   newly settled: {}", first.newly_settled);
    let second = app.settlement.settle(alice, alice_split)?;
    println!("   second attempt newly settled: {}", second.newly_settled);

    for split in app.expenses.splits_for_expense(dinner.expense.id)? {
        let state = if split.settled { "settled" } else { "unsettled" };
        println!("   member {} → {} ({})", split.member_id, split.amount, state);
    }

    // 4. Rounding remainder
    println!("\n🧮 Pat pays 100.00 USD for groceries...");
    let groceries = app.expenses.create_expense(
        pat,
        NewExpense {
            amount: parse_amount("100.00")?,
            description: "Groceries".to_string(),
            category_id: food,
            group_id: Some(group),
            currency: "USD".to_string(),
            split: SplitPolicy::Equal,
        },
    )?;
    for split in &groceries.splits {
        println!("   member {} owes {}", split.member_id, split.amount);
    }

    // 5. Reminder + inboxes
    let bob_split = split_of(&groceries.splits, bob)?;
    app.settlement.remind(pat, bob_split)?;

    println!("\n🔔 Inboxes:");
    for (name, user) in [("Pat", pat), ("Alice", alice), ("Bob", bob)] {
        for notification in app.notifier.list_notifications(user, false)? {
            println!("   {}: [{}] {}", name, notification.title, notification.message);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Demo complete ({} events broadcast)", app.channel.events_broadcast());
    Ok(())
}

fn split_of(splits: &[group_ledger::SplitView], member: StableId) -> Result<StableId> {
    splits
        .iter()
        .find(|split| split.member_id == member)
        .map(|split| split.id)
        .with_context(|| format!("No split for member {}", member))
}
