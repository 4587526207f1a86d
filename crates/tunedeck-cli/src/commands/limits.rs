//! Rate-limit inspection commands
//!
//! Shows the per-service window configuration and, for a long-running
//! process, would show live occupancy. From a fresh CLI process every
//! window starts empty, so `show` is primarily a configuration view.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::print_rows;
use tunedeck_core::{RateLimitConfig, RateLimiter};

#[derive(Subcommand)]
pub enum LimitsAction {
    /// Show the configured per-service windows
    Show,
}

/// Window row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct WindowRow {
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "In Window")]
    pub current: u32,
    #[tabled(rename = "Max")]
    pub max: u32,
    #[tabled(rename = "Wait (ms)")]
    pub wait_ms: u64,
}

pub async fn execute(ctx: &Context, action: LimitsAction) -> Result<()> {
    match action {
        LimitsAction::Show => show_limits(ctx).await,
    }
}

async fn show_limits(ctx: &Context) -> Result<()> {
    let limiter = RateLimiter::new(RateLimitConfig::default());

    let rows: Vec<WindowRow> = limiter
        .statuses()
        .into_iter()
        .map(|status| WindowRow {
            service: status.service,
            current: status.current,
            max: status.max,
            wait_ms: status.wait_ms,
        })
        .collect();

    print_rows(&rows, ctx.format)?;
    Ok(())
}
