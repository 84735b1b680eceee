//! Login attempt tracking
//!
//! Counts failed logins per client IP and per username and turns repeated
//! failures into a timed block. A block is only ever lifted by time: a
//! successful login clears counters, never blocks.
//!
//! A login takes an [`AttemptPermit`] before the password is checked and
//! hands it back through [`LoginAttemptTracker::fail`],
//! [`LoginAttemptTracker::succeed`] or [`LoginAttemptTracker::abandon`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::attempt_store::{
    AttemptPolicy, AttemptStore, FailureOutcome, InMemoryAttemptStore, Reservation,
};

/// Retry hint when enough failing attempts are already in flight
const SATURATED_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Which key caused a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Ip,
    Username,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Username => "username",
        }
    }

    /// Client-facing explanation for a 429
    pub fn message(self, retry_after_secs: u64) -> String {
        match self {
            Self::Ip => format!(
                "Too many login attempts. Try again in {} seconds.",
                retry_after_secs
            ),
            Self::Username => format!(
                "Account temporarily locked. Try again in {} seconds or reset your password.",
                retry_after_secs
            ),
        }
    }
}

/// Outcome of [`LoginAttemptTracker::check_blocked`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStatus {
    pub blocked: bool,
    pub reason: Option<BlockReason>,
    /// Whole seconds until the block lifts, rounded up; 0 when not blocked
    pub retry_after_secs: u64,
}

impl BlockStatus {
    pub fn clear() -> Self {
        Self {
            blocked: false,
            reason: None,
            retry_after_secs: 0,
        }
    }

    fn blocked(reason: BlockReason, remaining: Duration) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
            retry_after_secs: ceil_secs(remaining),
        }
    }
}

/// A reserved slot on the IP key and, if given, the username key
#[derive(Debug)]
#[must_use = "a permit holds an attempt slot until it is settled"]
pub struct AttemptPermit {
    ip: String,
    username: Option<String>,
}

impl AttemptPermit {
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Normalized username, if one was submitted
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// Per-key results of recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReport {
    pub ip: FailureOutcome,
    pub username: Option<FailureOutcome>,
}

/// Current counts, used for `X-RateLimit-*` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSnapshot {
    pub ip_attempts: u32,
    pub user_attempts: u32,
    pub max_attempts: u32,
    /// `max_attempts` minus the larger of the two counts
    pub remaining: u32,
}

/// Tracks failed logins by IP and username
#[derive(Clone)]
pub struct LoginAttemptTracker {
    store: Arc<dyn AttemptStore>,
    policy: AttemptPolicy,
}

impl std::fmt::Debug for LoginAttemptTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAttemptTracker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl LoginAttemptTracker {
    pub fn new(store: Arc<dyn AttemptStore>, policy: AttemptPolicy) -> Self {
        Self { store, policy }
    }

    /// Tracker backed by a fresh in-memory store
    pub fn in_memory(policy: AttemptPolicy) -> Self {
        Self::new(Arc::new(InMemoryAttemptStore::new()), policy)
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Count a failed attempt against the IP and, if given, the username
    pub async fn record_failure(&self, ip: &str, username: Option<&str>) -> FailureReport {
        let username = username.and_then(normalize_username);
        self.count_failure(ip, username.as_deref(), false).await
    }

    /// Clear failure counters for both keys after a successful login
    pub async fn record_success(&self, ip: &str, username: Option<&str>) {
        self.store.clear_failures(&ip_key(ip)).await;
        if let Some(name) = username.and_then(normalize_username) {
            self.store.clear_failures(&user_key(&name)).await;
        }
    }

    /// Reserve an attempt slot on both keys, or report why the caller must wait
    ///
    /// The IP is reserved first. A refused username gives the IP slot back.
    pub async fn begin_attempt(
        &self,
        ip: &str,
        username: Option<&str>,
    ) -> Result<AttemptPermit, BlockStatus> {
        let ip = ip.trim().to_string();
        let ip_key = ip_key(&ip);
        let reservation = self.store.try_reserve(&ip_key, &self.policy).await;
        if let Some(status) = refusal(BlockReason::Ip, reservation) {
            return Err(status);
        }

        let username = username.and_then(normalize_username);
        if let Some(name) = &username {
            let reservation = self.store.try_reserve(&user_key(name), &self.policy).await;
            if let Some(status) = refusal(BlockReason::Username, reservation) {
                self.store.release(&ip_key).await;
                return Err(status);
            }
        }

        Ok(AttemptPermit { ip, username })
    }

    /// Settle a permit as a failed attempt
    pub async fn fail(&self, permit: AttemptPermit) -> FailureReport {
        self.count_failure(&permit.ip, permit.username.as_deref(), true)
            .await
    }

    /// Settle a permit as a successful login, clearing both counters
    pub async fn succeed(&self, permit: AttemptPermit) {
        self.release(&permit).await;
        self.record_success(&permit.ip, permit.username.as_deref())
            .await;
    }

    /// Give a permit back without counting anything
    pub async fn abandon(&self, permit: AttemptPermit) {
        self.release(&permit).await;
    }

    async fn release(&self, permit: &AttemptPermit) {
        self.store.release(&ip_key(&permit.ip)).await;
        if let Some(name) = &permit.username {
            self.store.release(&user_key(name)).await;
        }
    }

    async fn count_failure(&self, ip: &str, username: Option<&str>, settle: bool) -> FailureReport {
        let ip_key = ip_key(ip);
        let ip_outcome = if settle {
            self.store.settle_failure(&ip_key, &self.policy).await
        } else {
            self.store.register_failure(&ip_key, &self.policy).await
        };
        log_outcome("ip", ip, ip_outcome);

        let username_outcome = match username {
            Some(name) => {
                let key = user_key(name);
                let outcome = if settle {
                    self.store.settle_failure(&key, &self.policy).await
                } else {
                    self.store.register_failure(&key, &self.policy).await
                };
                log_outcome("username", name, outcome);
                Some(outcome)
            }
            None => None,
        };

        FailureReport {
            ip: ip_outcome,
            username: username_outcome,
        }
    }

    /// Whether either key is currently blocked; the IP is checked first
    pub async fn check_blocked(&self, ip: &str, username: Option<&str>) -> BlockStatus {
        if let Some(remaining) = self.store.block_remaining(&ip_key(ip)).await {
            return BlockStatus::blocked(BlockReason::Ip, remaining);
        }

        if let Some(name) = username.and_then(normalize_username) {
            if let Some(remaining) = self.store.block_remaining(&user_key(&name)).await {
                return BlockStatus::blocked(BlockReason::Username, remaining);
            }
        }

        BlockStatus::clear()
    }

    pub async fn attempts(&self, ip: &str, username: Option<&str>) -> AttemptSnapshot {
        let ip_attempts = self.store.failure_count(&ip_key(ip), &self.policy).await;
        let user_attempts = match username.and_then(normalize_username) {
            Some(name) => self.store.failure_count(&user_key(&name), &self.policy).await,
            None => 0,
        };

        AttemptSnapshot {
            ip_attempts,
            user_attempts,
            max_attempts: self.policy.max_attempts,
            remaining: self
                .policy
                .max_attempts
                .saturating_sub(ip_attempts.max(user_attempts)),
        }
    }

    /// Run one eviction pass
    pub async fn sweep(&self) -> usize {
        self.store.evict_expired(&self.policy).await
    }

    /// Evict expired entries every `interval` until the task is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = tracker.sweep().await;
                if removed > 0 {
                    debug!(removed, "Swept expired login attempt entries");
                }
            }
        })
    }
}

fn refusal(reason: BlockReason, reservation: Reservation) -> Option<BlockStatus> {
    match reservation {
        Reservation::Granted => None,
        Reservation::Blocked { retry_after } => Some(BlockStatus::blocked(reason, retry_after)),
        Reservation::Saturated => {
            debug!(reason = reason.as_str(), "Attempt refused, enough attempts already in flight");
            Some(BlockStatus::blocked(reason, SATURATED_RETRY_AFTER))
        }
    }
}

fn ip_key(ip: &str) -> String {
    format!("ip:{}", ip.trim())
}

fn user_key(normalized: &str) -> String {
    format!("user:{}", normalized)
}

fn normalize_username(username: &str) -> Option<String> {
    let trimmed = username.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

fn log_outcome(kind: &'static str, subject: &str, outcome: FailureOutcome) {
    match outcome {
        FailureOutcome::Counted(count) => {
            info!(kind, subject = %subject, count, "Failed login attempt recorded");
        }
        FailureOutcome::Blocked { retry_after } => {
            warn!(
                kind,
                subject = %subject,
                block_secs = retry_after.as_secs(),
                "Too many failed login attempts, blocking"
            );
        }
    }
}
