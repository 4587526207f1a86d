//! Sliding-window rate limiting
//!
//! Per-service admission control. Each service name owns an independent
//! window of request timestamps; admission is a check-and-reserve (a granted
//! check records the request), so callers must never call it speculatively.
//!
//! The limiter never blocks and never errors; it only answers and mutates
//! its own bookkeeping. Callers that are refused ask [`RateLimiter::wait_time`]
//! for the delay until the oldest in-window request expires and schedule a
//! retry instead of polling.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

// ============================================================================
// Constants
// ============================================================================

/// Fallback window for service names with no explicit configuration
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Fallback window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Service name for the scraper search backend
pub const SERVICE_SCRAPER: &str = "scraper";

/// Service name for the quota-metered video API
pub const SERVICE_VIDEO_API: &str = "video-api";

/// Service name for playlist loads
pub const SERVICE_PLAYLIST: &str = "playlist";

// ============================================================================
// Configuration
// ============================================================================

/// Admission window for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum requests admitted inside one window
    pub max_requests: u32,
    /// Trailing window length
    pub window: Duration,
}

impl WindowConfig {
    /// Create a window of `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Rate limiter configuration: named per-service windows plus a fallback
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Explicitly configured services
    pub services: HashMap<String, WindowConfig>,
    /// Window applied to unknown service names
    pub default_window: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut services = HashMap::new();
        // The scraper tolerates modest traffic, the metered API is looser
        // (quota is enforced per credential, not per minute), playlist loads
        // are the heaviest calls and get the tightest window.
        services.insert(
            SERVICE_SCRAPER.to_string(),
            WindowConfig::new(10, Duration::from_secs(60)),
        );
        services.insert(
            SERVICE_VIDEO_API.to_string(),
            WindowConfig::new(30, Duration::from_secs(60)),
        );
        services.insert(
            SERVICE_PLAYLIST.to_string(),
            WindowConfig::new(5, Duration::from_secs(60)),
        );
        Self {
            services,
            default_window: WindowConfig::default(),
        }
    }
}

impl RateLimitConfig {
    /// Configuration with no named services; everything uses `default_window`
    pub fn uniform(default_window: WindowConfig) -> Self {
        Self {
            services: HashMap::new(),
            default_window,
        }
    }

    /// Add or replace a named service window
    pub fn with_service(mut self, name: impl Into<String>, window: WindowConfig) -> Self {
        self.services.insert(name.into(), window);
        self
    }

    fn window_for(&self, service: &str) -> WindowConfig {
        self.services
            .get(service)
            .copied()
            .unwrap_or(self.default_window)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Read-only view of one service's window, for observability panels
#[derive(Debug, Clone, Serialize)]
pub struct ServiceWindowStatus {
    /// Service name
    pub service: String,
    /// Requests currently inside the window
    pub current: u32,
    /// Window capacity
    pub max: u32,
    /// Milliseconds until the oldest in-window request expires (0 if room)
    pub wait_ms: u64,
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// One service's rolling timestamp list
#[derive(Debug)]
struct Window {
    config: WindowConfig,
    timestamps: VecDeque<Instant>,
}

impl Window {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            timestamps: VecDeque::new(),
        }
    }

    /// Drop timestamps older than the window, relative to `now`
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) > self.config.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-service sliding-window rate limiter
///
/// Windows are created on first reference to a service name and live for the
/// process; [`RateLimiter::clear`] empties one on demand.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check-and-reserve admission for `service`
    ///
    /// Returns `true` and records the request when the window has room,
    /// `false` otherwise. A granted check counts against the window, so
    /// callers must only call this when they intend to dispatch.
    pub fn check_and_reserve(&self, service: &str) -> bool {
        let now = Instant::now();
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = windows
            .entry(service.to_string())
            .or_insert_with(|| Window::new(self.config.window_for(service)));
        window.prune(now);

        if (window.timestamps.len() as u32) < window.config.max_requests {
            window.timestamps.push_back(now);
            true
        } else {
            log::debug!(
                "[ratelimit] {} window full ({}/{})",
                service,
                window.timestamps.len(),
                window.config.max_requests
            );
            false
        }
    }

    /// Time until the oldest in-window request for `service` expires
    ///
    /// Zero when the window has room (or has never been used).
    pub fn wait_time(&self, service: &str) -> Duration {
        let now = Instant::now();
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(window) = windows.get_mut(service) else {
            return Duration::ZERO;
        };
        window.prune(now);
        if (window.timestamps.len() as u32) < window.config.max_requests {
            return Duration::ZERO;
        }
        match window.timestamps.front() {
            Some(&oldest) => window
                .config
                .window
                .saturating_sub(now.duration_since(oldest)),
            None => Duration::ZERO,
        }
    }

    /// Read-only status for one service
    pub fn status(&self, service: &str) -> ServiceWindowStatus {
        let wait_ms = self.wait_time(service).as_millis() as u64;
        let now = Instant::now();
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let config = self.config.window_for(service);
        let current = match windows.get_mut(service) {
            Some(window) => {
                window.prune(now);
                window.timestamps.len() as u32
            }
            None => 0,
        };
        ServiceWindowStatus {
            service: service.to_string(),
            current,
            max: config.max_requests,
            wait_ms,
        }
    }

    /// Status for every configured or referenced service
    pub fn statuses(&self) -> Vec<ServiceWindowStatus> {
        let mut names: Vec<String> = self.config.services.keys().cloned().collect();
        {
            let windows = match self.windows.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for name in windows.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names.into_iter().map(|name| self.status(&name)).collect()
    }

    /// Drop all recorded requests for one service
    pub fn clear(&self, service: &str) {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(window) = windows.get_mut(service) {
            window.timestamps.clear();
        }
    }

    /// Drop all recorded requests for every service
    pub fn clear_all(&self) {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for window in windows.values_mut() {
            window.timestamps.clear();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_window() -> RateLimitConfig {
        RateLimitConfig::uniform(WindowConfig::new(2, Duration::from_millis(1000)))
    }

    // =========================================================================
    // Admission Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_admission_within_window() {
        let limiter = RateLimiter::new(small_window());

        assert!(limiter.check_and_reserve("svc"));
        assert!(limiter.check_and_reserve("svc"));
        assert!(!limiter.check_and_reserve("svc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_reopens_after_window() {
        let limiter = RateLimiter::new(small_window());

        assert!(limiter.check_and_reserve("svc"));
        assert!(limiter.check_and_reserve("svc"));
        assert!(!limiter.check_and_reserve("svc"));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(limiter.check_and_reserve("svc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_are_independent_per_service() {
        let limiter = RateLimiter::new(small_window());

        assert!(limiter.check_and_reserve("a"));
        assert!(limiter.check_and_reserve("a"));
        assert!(!limiter.check_and_reserve("a"));

        // A different service has its own window
        assert!(limiter.check_and_reserve("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_check_does_not_reserve() {
        let limiter = RateLimiter::new(small_window());

        assert!(limiter.check_and_reserve("svc"));
        assert!(limiter.check_and_reserve("svc"));
        assert!(!limiter.check_and_reserve("svc"));

        // The refused call must not have extended the window
        assert_eq!(limiter.status("svc").current, 2);
    }

    // =========================================================================
    // Wait Time Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_zero_with_room() {
        let limiter = RateLimiter::new(small_window());
        assert_eq!(limiter.wait_time("svc"), Duration::ZERO);

        limiter.check_and_reserve("svc");
        assert_eq!(limiter.wait_time("svc"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_tracks_oldest_request() {
        let limiter = RateLimiter::new(small_window());
        limiter.check_and_reserve("svc");

        tokio::time::advance(Duration::from_millis(400)).await;
        limiter.check_and_reserve("svc");

        // Window full; oldest request is 400ms old, so 600ms remain
        let wait = limiter.wait_time("svc");
        assert_eq!(wait, Duration::from_millis(600));
    }

    // =========================================================================
    // Status / Clearing Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_status_untouched_service() {
        let limiter = RateLimiter::default();
        let status = limiter.status(SERVICE_SCRAPER);
        assert_eq!(status.current, 0);
        assert_eq!(status.max, 10);
        assert_eq!(status.wait_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_statuses_cover_configured_and_referenced() {
        let limiter = RateLimiter::default();
        limiter.check_and_reserve("ad-hoc");

        let statuses = limiter.statuses();
        let names: Vec<&str> = statuses.iter().map(|s| s.service.as_str()).collect();
        assert!(names.contains(&"ad-hoc"));
        assert!(names.contains(&SERVICE_SCRAPER));
        assert!(names.contains(&SERVICE_VIDEO_API));
        assert!(names.contains(&SERVICE_PLAYLIST));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_service_uses_default_window() {
        let limiter = RateLimiter::default();
        let status = limiter.status("never-configured");
        assert_eq!(status.max, DEFAULT_MAX_REQUESTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_reopens_window() {
        let limiter = RateLimiter::new(small_window());
        limiter.check_and_reserve("svc");
        limiter.check_and_reserve("svc");
        assert!(!limiter.check_and_reserve("svc"));

        limiter.clear("svc");
        assert!(limiter.check_and_reserve("svc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all() {
        let limiter = RateLimiter::new(small_window());
        limiter.check_and_reserve("a");
        limiter.check_and_reserve("b");

        limiter.clear_all();
        assert_eq!(limiter.status("a").current, 0);
        assert_eq!(limiter.status("b").current, 0);
    }
}
