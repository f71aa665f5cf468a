//! Attempt counter maintenance commands

use crate::config::Config;
use crate::db::{AttemptScope, Store};

pub async fn cmd_reset_attempts(
    config: &Config,
    key: &str,
    scope: Option<AttemptScope>,
) -> anyhow::Result<()> {
    let store = Store::open(config).await?;

    let scopes = scope.map_or_else(|| vec![AttemptScope::User, AttemptScope::Ip], |s| vec![s]);
    for scope in scopes {
        store.attempts.reset(key, scope).await?;
        println!("✓ Reset {scope} attempts for '{key}'");
    }

    Ok(())
}

pub async fn cmd_sweep(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(config).await?;
    let removed = store.attempts.sweep().await?;
    println!("✓ Removed {removed} expired attempt counter(s)");
    Ok(())
}
