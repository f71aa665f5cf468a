//! List users command handler

use crate::config::Config;
use crate::db::Store;

pub async fn cmd_list_users(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(config).await?;
    let users = store.users.list_users().await;

    if users.is_empty() {
        println!("No users yet.");
        println!();
        println!("Create the owner account at /set_credentials once the server is running.");
        return Ok(());
    }

    println!("Users ({} total)", users.len());
    println!("{:-<50}", "");

    for user in users {
        let created = chrono::DateTime::from_timestamp(user.created_at, 0)
            .map_or_else(|| "?".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
        let role = if user.owner { "owner" } else { "admin" };
        println!("{:<24} {:<8} created {}", user.username, role, created);
    }

    Ok(())
}
