//! Storage for failed-login counters and blocks
//!
//! The tracker talks to an [`AttemptStore`]; the default is an in-process
//! [`InMemoryAttemptStore`]. Multi-instance deployments can use
//! [`RedisAttemptStore`], which keeps counters in Redis and falls back to the
//! in-memory store while Redis is unreachable, so blocking never silently
//! turns off.
//!
//! Every operation is atomic per key: the read-check-write of a failure runs
//! under one dashmap shard lock, or inside one Lua script on Redis.
//!
//! Login attempts reserve a slot with [`AttemptStore::try_reserve`] before
//! the password is checked. A key refuses new reservations once its counted
//! failures plus the attempts still in flight reach the threshold, so
//! parallel guesses cannot outrun the counter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound for the window and block durations
pub const MAX_POLICY_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Reservations older than this no longer hold a slot
///
/// Covers attempts whose request was dropped before settling.
pub const RESERVATION_TTL: Duration = Duration::from_secs(60);

/// Thresholds for promoting failures to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// Failures within `window` that trigger a block
    pub max_attempts: u32,
    /// Rolling window, measured from a key's first failure
    pub window: Duration,
    /// How long a block lasts
    pub block_duration: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            block_duration: Duration::from_secs(30 * 60),
        }
    }
}

/// Result of registering one failure for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted; the value is the count within the current window
    Counted(u32),
    /// This failure reached the threshold and the key is now blocked
    Blocked { retry_after: Duration },
}

/// Result of asking for an attempt slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    /// The key is blocked
    Blocked { retry_after: Duration },
    /// Failures plus in-flight attempts already reach the threshold
    Saturated,
}

/// Backing store for the login attempt tracker
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Count one failure for `key`, blocking it when the threshold is reached
    async fn register_failure(&self, key: &str, policy: &AttemptPolicy) -> FailureOutcome;

    /// Take an in-flight slot for `key` unless it is blocked or saturated
    async fn try_reserve(&self, key: &str, policy: &AttemptPolicy) -> Reservation;

    /// Give back a slot without counting a failure
    async fn release(&self, key: &str);

    /// Turn a reserved slot into a counted failure
    async fn settle_failure(&self, key: &str, policy: &AttemptPolicy) -> FailureOutcome;

    /// Forget the failure counter for `key`; an active block is kept
    async fn clear_failures(&self, key: &str);

    /// Time left on `key`'s block, if it is blocked
    async fn block_remaining(&self, key: &str) -> Option<Duration>;

    /// Failures counted for `key` in its current window
    async fn failure_count(&self, key: &str, policy: &AttemptPolicy) -> u32;

    /// Drop counters and blocks that have expired, returning how many were removed
    async fn evict_expired(&self, policy: &AttemptPolicy) -> usize;
}

/// `now + duration` without overflowing on absurd durations
fn deadline(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration.min(MAX_POLICY_DURATION))
        .unwrap_or(now)
}

#[derive(Debug, Clone, Copy)]
struct KeyState {
    failures: u32,
    first_failure: Instant,
    in_flight: u32,
    last_reserved: Instant,
    blocked_until: Option<Instant>,
}

impl KeyState {
    fn new(now: Instant) -> Self {
        Self {
            failures: 0,
            first_failure: now,
            in_flight: 0,
            last_reserved: now,
            blocked_until: None,
        }
    }

    fn failures_at(&self, now: Instant, window: Duration) -> u32 {
        if now.saturating_duration_since(self.first_failure) >= window {
            0
        } else {
            self.failures
        }
    }

    fn in_flight_at(&self, now: Instant) -> u32 {
        if now.saturating_duration_since(self.last_reserved) >= RESERVATION_TTL {
            0
        } else {
            self.in_flight
        }
    }

    fn block_remaining(&self, now: Instant) -> Option<Duration> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| until.saturating_duration_since(now))
    }

    fn is_idle(&self, now: Instant, window: Duration) -> bool {
        self.failures_at(now, window) == 0
            && self.in_flight_at(now) == 0
            && self.block_remaining(now).is_none()
    }

    fn release(&mut self, now: Instant) {
        self.in_flight = self.in_flight_at(now).saturating_sub(1);
    }

    fn count_failure(&mut self, now: Instant, policy: &AttemptPolicy) -> FailureOutcome {
        if self.failures_at(now, policy.window) == 0 {
            self.failures = 0;
            self.first_failure = now;
        }
        self.failures += 1;

        if self.failures >= policy.max_attempts.max(1) {
            // Counting restarts once the block is in place
            self.failures = 0;
            let until = deadline(now, policy.block_duration);
            self.blocked_until = Some(until);
            FailureOutcome::Blocked {
                retry_after: until.saturating_duration_since(now),
            }
        } else {
            FailureOutcome::Counted(self.failures)
        }
    }
}

/// In-process attempt store
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    keys: DashMap<String, KeyState>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with live state
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }

    /// Attempts currently holding a slot for `key`
    pub fn in_flight(&self, key: &str) -> u32 {
        let now = Instant::now();
        self.keys
            .get(key)
            .map(|state| state.in_flight_at(now))
            .unwrap_or(0)
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn register_failure(&self, key: &str, policy: &AttemptPolicy) -> FailureOutcome {
        let now = Instant::now();
        // The entry guard holds the shard lock until it is dropped
        let mut state = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));
        state.count_failure(now, policy)
    }

    async fn try_reserve(&self, key: &str, policy: &AttemptPolicy) -> Reservation {
        let now = Instant::now();
        let mut state = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));

        if let Some(retry_after) = state.block_remaining(now) {
            return Reservation::Blocked { retry_after };
        }

        let in_flight = state.in_flight_at(now);
        if state.failures_at(now, policy.window) + in_flight >= policy.max_attempts.max(1) {
            return Reservation::Saturated;
        }

        state.in_flight = in_flight + 1;
        state.last_reserved = now;
        Reservation::Granted
    }

    async fn release(&self, key: &str) {
        let now = Instant::now();
        if let Some(mut state) = self.keys.get_mut(key) {
            state.release(now);
        }
    }

    async fn settle_failure(&self, key: &str, policy: &AttemptPolicy) -> FailureOutcome {
        let now = Instant::now();
        let mut state = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));
        state.release(now);
        state.count_failure(now, policy)
    }

    async fn clear_failures(&self, key: &str) {
        if let Some(mut state) = self.keys.get_mut(key) {
            state.failures = 0;
        }
    }

    async fn block_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let state = self.keys.get(key).map(|entry| *entry.value())?;

        if let Some(remaining) = state.block_remaining(now) {
            return Some(remaining);
        }

        if state.blocked_until.is_some() {
            self.keys.remove_if(key, |_, state| {
                state.failures == 0
                    && state.in_flight_at(now) == 0
                    && state.block_remaining(now).is_none()
            });
        }
        None
    }

    async fn failure_count(&self, key: &str, policy: &AttemptPolicy) -> u32 {
        let now = Instant::now();
        self.keys
            .get(key)
            .map(|state| state.failures_at(now, policy.window))
            .unwrap_or(0)
    }

    async fn evict_expired(&self, policy: &AttemptPolicy) -> usize {
        let now = Instant::now();
        let before = self.tracked_keys();

        self.keys.retain(|_, state| !state.is_idle(now, policy.window));

        before.saturating_sub(self.tracked_keys())
    }
}

/// Atomic failure registration:
/// optionally give back an in-flight slot, increment, start the window on
/// the first failure, and on reaching the threshold swap the counter for a
/// block key with its own expiry.
/// Returns the new count, or the negated block length in milliseconds.
static REGISTER_FAILURE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
        local counter_key = KEYS[1]
        local block_key = KEYS[2]
        local in_flight_key = KEYS[3]
        local max_attempts = tonumber(ARGV[1])
        local window_ms = tonumber(ARGV[2])
        local block_ms = tonumber(ARGV[3])

        if ARGV[4] == '1' then
            local in_flight = tonumber(redis.call('GET', in_flight_key) or '0')
            if in_flight > 1 then
                redis.call('DECR', in_flight_key)
            else
                redis.call('DEL', in_flight_key)
            end
        end

        local count = redis.call('INCR', counter_key)
        if count == 1 then
            redis.call('PEXPIRE', counter_key, window_ms)
        end

        if count >= max_attempts then
            redis.call('DEL', counter_key)
            redis.call('SET', block_key, '1', 'PX', block_ms)
            return -block_ms
        end

        return count
        "#,
    )
});

/// Atomic slot reservation:
/// the negated block TTL when blocked, 0 when saturated, 1 when granted.
static RESERVE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
        local counter_key = KEYS[1]
        local block_key = KEYS[2]
        local in_flight_key = KEYS[3]
        local max_attempts = tonumber(ARGV[1])
        local ttl_ms = tonumber(ARGV[2])

        local blocked_ms = redis.call('PTTL', block_key)
        if blocked_ms > 0 then
            return -blocked_ms
        end

        local count = tonumber(redis.call('GET', counter_key) or '0')
        local in_flight = tonumber(redis.call('GET', in_flight_key) or '0')
        if count + in_flight >= max_attempts then
            return 0
        end

        redis.call('INCR', in_flight_key)
        redis.call('PEXPIRE', in_flight_key, ttl_ms)
        return 1
        "#,
    )
});

static RELEASE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
        local in_flight = tonumber(redis.call('GET', KEYS[1]) or '0')
        if in_flight > 1 then
            return redis.call('DECR', KEYS[1])
        end
        redis.call('DEL', KEYS[1])
        return 0
        "#,
    )
});

/// Redis-backed attempt store shared across API instances
#[derive(Clone)]
pub struct RedisAttemptStore {
    redis: Arc<redis::Client>,
    fallback: Arc<InMemoryAttemptStore>,
    key_prefix: String,
}

impl RedisAttemptStore {
    pub fn new(redis: redis::Client) -> Self {
        Self {
            redis: Arc::new(redis),
            fallback: Arc::new(InMemoryAttemptStore::new()),
            key_prefix: "login_attempts".to_string(),
        }
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}:count:{}", self.key_prefix, key)
    }

    fn block_key(&self, key: &str) -> String {
        format!("{}:block:{}", self.key_prefix, key)
    }

    fn in_flight_key(&self, key: &str) -> String {
        format!("{}:inflight:{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        match self.redis.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(
                    error = %e,
                    "Redis unavailable for login attempts, using in-memory fallback"
                );
                None
            }
        }
    }

    async fn count_failure(&self, key: &str, policy: &AttemptPolicy, settle: bool) -> FailureOutcome {
        let Some(mut conn) = self.connection().await else {
            return self.local_failure(key, policy, settle).await;
        };

        let result: Result<i64, _> = REGISTER_FAILURE_SCRIPT
            .key(self.counter_key(key))
            .key(self.block_key(key))
            .key(self.in_flight_key(key))
            .arg(policy.max_attempts.max(1))
            .arg(millis(policy.window))
            .arg(millis(policy.block_duration))
            .arg(if settle { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(count) if count >= 0 => FailureOutcome::Counted(count as u32),
            Ok(negated_ms) => FailureOutcome::Blocked {
                retry_after: Duration::from_millis(negated_ms.unsigned_abs()),
            },
            Err(e) => {
                warn!(error = %e, key = %key, "Failure registration failed, using in-memory fallback");
                self.local_failure(key, policy, settle).await
            }
        }
    }

    async fn local_failure(&self, key: &str, policy: &AttemptPolicy, settle: bool) -> FailureOutcome {
        if settle {
            self.fallback.settle_failure(key, policy).await
        } else {
            self.fallback.register_failure(key, policy).await
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.min(MAX_POLICY_DURATION).as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn register_failure(&self, key: &str, policy: &AttemptPolicy) -> FailureOutcome {
        self.count_failure(key, policy, false).await
    }

    async fn try_reserve(&self, key: &str, policy: &AttemptPolicy) -> Reservation {
        // A block recorded during a Redis outage still applies
        if let Some(retry_after) = self.fallback.block_remaining(key).await {
            return Reservation::Blocked { retry_after };
        }

        let Some(mut conn) = self.connection().await else {
            return self.fallback.try_reserve(key, policy).await;
        };

        let result: Result<i64, _> = RESERVE_SCRIPT
            .key(self.counter_key(key))
            .key(self.block_key(key))
            .key(self.in_flight_key(key))
            .arg(policy.max_attempts.max(1))
            .arg(millis(RESERVATION_TTL))
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(1) => Reservation::Granted,
            Ok(0) => Reservation::Saturated,
            Ok(negated_ms) => Reservation::Blocked {
                retry_after: Duration::from_millis(negated_ms.unsigned_abs()),
            },
            Err(e) => {
                warn!(error = %e, key = %key, "Attempt reservation failed, using in-memory fallback");
                self.fallback.try_reserve(key, policy).await
            }
        }
    }

    async fn release(&self, key: &str) {
        self.fallback.release(key).await;

        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = RELEASE_SCRIPT
            .key(self.in_flight_key(key))
            .invoke_async::<_, i64>(&mut conn)
            .await
        {
            // The slot lapses with its TTL
            debug!(error = %e, key = %key, "Failed to release attempt slot");
        }
    }

    async fn settle_failure(&self, key: &str, policy: &AttemptPolicy) -> FailureOutcome {
        self.count_failure(key, policy, true).await
    }

    async fn clear_failures(&self, key: &str) {
        self.fallback.clear_failures(key).await;

        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = redis::cmd("DEL")
            .arg(self.counter_key(key))
            .query_async::<_, i64>(&mut conn)
            .await
        {
            warn!(error = %e, key = %key, "Failed to clear login failure counter");
        }
    }

    async fn block_remaining(&self, key: &str) -> Option<Duration> {
        // A block recorded during a Redis outage still applies
        if let Some(remaining) = self.fallback.block_remaining(key).await {
            return Some(remaining);
        }

        let mut conn = self.connection().await?;
        match redis::cmd("PTTL")
            .arg(self.block_key(key))
            .query_async::<_, i64>(&mut conn)
            .await
        {
            Ok(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, key = %key, "Block lookup failed");
                None
            }
        }
    }

    async fn failure_count(&self, key: &str, policy: &AttemptPolicy) -> u32 {
        let local = self.fallback.failure_count(key, policy).await;

        let Some(mut conn) = self.connection().await else {
            return local;
        };
        match redis::cmd("GET")
            .arg(self.counter_key(key))
            .query_async::<_, Option<u32>>(&mut conn)
            .await
        {
            Ok(remote) => remote.unwrap_or(0).max(local),
            Err(e) => {
                debug!(error = %e, key = %key, "Failure count lookup failed");
                local
            }
        }
    }

    async fn evict_expired(&self, policy: &AttemptPolicy) -> usize {
        // Redis keys carry their own TTLs; only the fallback needs sweeping
        self.fallback.evict_expired(policy).await
    }
}
