//! Credential management commands
//!
//! Commands for listing, adding, removing and rotating API credentials in
//! the shared pool.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use super::{load_pool, save_pool, Context};
use crate::output::{print_error, print_info, print_rows, print_success};
use tunedeck_core::{Credential, PoolError};

#[derive(Subcommand)]
pub enum CredentialsAction {
    /// List all credentials in the pool
    List,

    /// Add a credential (or update its usage if the key exists)
    Add {
        /// The API key
        key: String,

        /// Mark the key as user-supplied rather than bundled
        #[arg(long)]
        custom: bool,
    },

    /// Remove a credential from the pool
    Remove {
        /// The API key to remove
        key: String,
    },

    /// Rotate to the lowest-usage credential
    Rotate {
        /// Reason recorded in the rotation history
        #[arg(long, default_value = "manual")]
        reason: String,
    },

    /// Record quota usage for a credential
    Usage {
        /// The API key
        key: String,

        /// Used quota in percent (0-100)
        percent: f64,
    },

    /// Show the rotation history (newest first)
    History,
}

/// Credential row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct CredentialRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Usage %")]
    pub usage: String,
    #[tabled(rename = "Custom")]
    pub custom: String,
    #[tabled(rename = "Active")]
    pub active: String,
}

/// Rotation event row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "When")]
    pub timestamp: String,
    #[tabled(rename = "From")]
    pub from_key: String,
    #[tabled(rename = "To")]
    pub to_key: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

pub async fn execute(ctx: &Context, action: CredentialsAction) -> Result<()> {
    match action {
        CredentialsAction::List => list_credentials(ctx).await,
        CredentialsAction::Add { key, custom } => add_credential(ctx, key, custom).await,
        CredentialsAction::Remove { key } => remove_credential(ctx, key).await,
        CredentialsAction::Rotate { reason } => rotate_credential(ctx, reason).await,
        CredentialsAction::Usage { key, percent } => set_usage(ctx, key, percent).await,
        CredentialsAction::History => show_history(ctx).await,
    }
}

async fn list_credentials(ctx: &Context) -> Result<()> {
    let pool = load_pool(&ctx.store_path)?;
    let active_key = pool.active().await.map(|c| c.key);

    let rows: Vec<CredentialRow> = pool
        .credentials()
        .await
        .iter()
        .map(|cred| CredentialRow {
            key: cred.masked_key(),
            usage: format!("{:.1}", cred.quota_used_percent),
            custom: if cred.is_custom { "yes" } else { "no" }.to_string(),
            active: if Some(&cred.key) == active_key.as_ref() {
                "*"
            } else {
                ""
            }
            .to_string(),
        })
        .collect();

    if rows.is_empty() {
        print_info("No credentials configured.", ctx.quiet);
        print_info("Use 'tunedeck credentials add <key>' to add one.", ctx.quiet);
    } else {
        print_rows(&rows, ctx.format)?;
    }

    Ok(())
}

async fn add_credential(ctx: &Context, key: String, custom: bool) -> Result<()> {
    let credential = if custom {
        Credential::custom(key)
    } else {
        Credential::new(key)
    };

    if !credential.looks_valid() {
        print_error(&format!(
            "Key looks malformed: {}",
            credential.masked_key()
        ));
        return Ok(());
    }

    let pool = load_pool(&ctx.store_path)?;
    let masked = credential.masked_key();
    pool.upsert(credential).await;
    save_pool(&ctx.store_path, &pool).await?;

    print_success(&format!("Added credential {}", masked), ctx.quiet);
    Ok(())
}

async fn remove_credential(ctx: &Context, key: String) -> Result<()> {
    let pool = load_pool(&ctx.store_path)?;

    if pool.remove(&key).await {
        save_pool(&ctx.store_path, &pool).await?;
        print_success("Removed credential", ctx.quiet);
    } else {
        print_error("Credential not found");
    }

    Ok(())
}

async fn rotate_credential(ctx: &Context, reason: String) -> Result<()> {
    let pool = load_pool(&ctx.store_path)?;

    match pool.rotate(&reason).await {
        Ok(event) => {
            save_pool(&ctx.store_path, &pool).await?;
            if event.changed() {
                print_success(
                    &format!(
                        "Rotated to {}",
                        Credential::new(event.to_key.clone()).masked_key()
                    ),
                    ctx.quiet,
                );
            } else {
                print_info("Active credential already has the lowest usage.", ctx.quiet);
            }
        }
        Err(PoolError::NoCredentialAvailable) => {
            save_pool(&ctx.store_path, &pool).await?;
            print_error("No usable credential left. Add a fresh key with 'tunedeck credentials add'.");
        }
    }

    Ok(())
}

async fn set_usage(ctx: &Context, key: String, percent: f64) -> Result<()> {
    let pool = load_pool(&ctx.store_path)?;

    if pool.set_usage(&key, percent).await {
        save_pool(&ctx.store_path, &pool).await?;
        print_success(&format!("Recorded usage {:.1}%", percent.clamp(0.0, 100.0)), ctx.quiet);
    } else {
        print_error("Credential not found");
    }

    Ok(())
}

async fn show_history(ctx: &Context) -> Result<()> {
    let pool = load_pool(&ctx.store_path)?;

    let rows: Vec<HistoryRow> = pool
        .history()
        .await
        .iter()
        .map(|event| HistoryRow {
            timestamp: event
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            from_key: event
                .from_key
                .as_ref()
                .map(|k| Credential::new(k.clone()).masked_key())
                .unwrap_or_else(|| "-".to_string()),
            to_key: Credential::new(event.to_key.clone()).masked_key(),
            reason: event.reason.clone(),
        })
        .collect();

    if rows.is_empty() {
        print_info("No rotations recorded.", ctx.quiet);
    } else {
        print_rows(&rows, ctx.format)?;
    }

    Ok(())
}
