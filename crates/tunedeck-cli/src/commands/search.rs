//! Search command
//!
//! Runs a search through the full dispatch path: dedup queue, sliding-window
//! limiter and response cache, against a configurable upstream endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::json;

use super::{load_pool, Context};
use crate::output::{print_error, print_info};
use tunedeck_core::{
    search_cache_key, CacheConfig, Priority, QueueConfig, RateLimitConfig, RateLimiter,
    RequestQueue, ResponseCache, SERVICE_VIDEO_API,
};

#[derive(Args)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Upstream search endpoint (or set TUNEDECK_SEARCH_URL env var)
    #[arg(long, env = "TUNEDECK_SEARCH_URL")]
    pub url: Option<String>,

    /// Request priority: high, normal or low
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Cache TTL in seconds
    #[arg(long, default_value_t = 600)]
    pub ttl: u64,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,
}

pub async fn execute(ctx: &Context, args: SearchArgs) -> Result<()> {
    let url = args
        .url
        .clone()
        .ok_or_else(|| anyhow!("No search endpoint. Pass --url or set TUNEDECK_SEARCH_URL."))?;

    let pool = load_pool(&ctx.store_path)?;
    let key = match pool.active().await {
        Some(cred) => cred.key,
        None => {
            print_error("No active credential. Add one with 'tunedeck credentials add'.");
            return Ok(());
        }
    };

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
    let queue = RequestQueue::new(Arc::clone(&limiter), QueueConfig::default());
    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));

    let cache_key = search_cache_key(&[("q", args.query.as_str())]);
    if args.no_cache {
        cache.invalidate(&cache_key).await;
    }
    let ttl = Some(Duration::from_secs(args.ttl));

    print_info(&format!("Searching for '{}'...", args.query), ctx.quiet);

    let query = args.query.clone();
    let cache_in = Arc::clone(&cache);
    let result = queue
        .enqueue(
            "search",
            SERVICE_VIDEO_API,
            &json!({"q": args.query}),
            args.priority,
            move || {
                let cache = Arc::clone(&cache_in);
                let url = url.clone();
                let query = query.clone();
                let key = key.clone();
                let cache_key = cache_key.clone();
                async move {
                    cache
                        .cached_fetch(
                            &url,
                            &[("q", query.as_str()), ("key", key.as_str())],
                            Some(cache_key),
                            ttl,
                        )
                        .await
                }
            },
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
