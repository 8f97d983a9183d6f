// Finance Ledger - admin CLI
//
//   finance-ledger init
//   finance-ledger add-user <email> [name]
//   finance-ledger add-payable <user-id> <name> <category> <amount>
//
// The database path comes from FINANCE_DB_PATH (default: finance.db).

use anyhow::{bail, Context, Result};
use finance_ledger::db::count_rows;
use finance_ledger::logging::init_tracing;
use finance_ledger::payables::create_payable;
use finance_ledger::{create_user, issue_session, open_database, NewPayable, ServerConfig};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = ServerConfig::from_env()?;
    init_tracing(&config.log_filter);

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&config),
        Some("add-user") => run_add_user(&config, &args[2..]),
        Some("add-payable") => run_add_payable(&config, &args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn run_init(config: &ServerConfig) -> Result<()> {
    let conn = open_database(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;

    println!("🔧 Database ready at {}", config.db_path.display());
    for table in ["users", "payables", "expenses", "budgets", "saving_goals", "notifications"] {
        println!("   {:<14} {}", table, count_rows(&conn, table)?);
    }
    Ok(())
}

fn run_add_user(config: &ServerConfig, args: &[String]) -> Result<()> {
    let Some(email) = args.first() else {
        bail!("usage: finance-ledger add-user <email> [name]");
    };
    let name = args.get(1).map(String::as_str);

    let conn = open_database(&config.db_path)?;
    let user = create_user(&conn, email, name)?;
    let token = issue_session(&conn, &user.id, None)?;

    println!("✓ Created user {} ({})", user.email, user.id);
    println!("  Bearer token: {}", token);
    println!("  The token is not stored in plain text; keep it now.");
    Ok(())
}

fn run_add_payable(config: &ServerConfig, args: &[String]) -> Result<()> {
    let [user_id, name, category, amount] = args else {
        bail!("usage: finance-ledger add-payable <user-id> <name> <category> <amount>");
    };
    let amount = Decimal::from_str(amount)
        .with_context(|| format!("'{}' is not a valid amount", amount))?;

    let conn = open_database(&config.db_path)?;
    let payable = create_payable(
        &conn,
        NewPayable {
            user_id: user_id.clone(),
            name: name.clone(),
            category: category.clone(),
            description: None,
            amount,
            due_date: None,
        },
    )?;

    println!("✓ Created payable {} for {} ({})", payable.name, payable.amount, payable.id);
    Ok(())
}

fn print_usage() {
    println!("Finance Ledger {}", finance_ledger::VERSION);
    println!();
    println!("Usage:");
    println!("  finance-ledger init");
    println!("  finance-ledger add-user <email> [name]");
    println!("  finance-ledger add-payable <user-id> <name> <category> <amount>");
    println!();
    println!("Run the API with: finance-server");
}
