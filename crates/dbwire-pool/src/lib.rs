//! Connection pooling for dbwire using asupersync.
//!
//! This crate implements a bounded pool of pooled sessions structured as a
//! "bag": a shared list of entries, each carrying an atomically-updated
//! lifecycle state (`Idle` / `InUse` / `Reserved` / `Removed`), plus a small
//! direct handoff queue that lets a releasing task hand its connection
//! straight to a waiter without the waiter re-scanning the whole bag.
//!
//! # Features
//!
//! - Generic over any `Connection` type via a pluggable [`ConnectionFactory`]
//! - RAII-based connection return (connections returned on drop)
//! - Timeout support via `Cx` context
//! - Round-robin bag scan with CAS-based entry acquisition
//! - Direct handoff queue for waiters, bypassing the shared list
//! - Alive-bypass window to skip validation on recently-used connections
//! - Explicit, caller-driven maintenance (`maintain`) and adaptive sizing
//!   (`adaptive_tick`) passes — see the module-level note below on why these
//!   are not self-spawning background tasks in this stack.
//! - Leak detection, keepalive pings, and before/after acquire hooks
//! - Pool statistics including an acquisition-latency histogram
//!
//! # Example
//!
//! ```rust,ignore
//! use dbwire_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(10).min_connections(2);
//! let pool = Pool::new(config, |cx: &Cx| async move {
//!     PgConnection::connect(cx, &pg_config).await
//! })?;
//!
//! let conn = pool.acquire(&cx).await?;
//! conn.query(&cx, "SELECT 1", &[]).await?;
//! // returned to the pool when `conn` drops
//! ```
//!
//! # Why no background tasks
//!
//! `asupersync` (this workspace's async runtime) exposes `Cx`/`Outcome` for
//! suspension points and a `RuntimeBuilder::current_thread().block_on` driver
//! for tests, but no `spawn` primitive appears anywhere in the driver crates
//! this pool was grounded on. The maintenance loop, keepalive sweep, and
//! adaptive sizer are therefore modeled as explicit async methods
//! (`maintain`, `adaptive_tick`) that the embedding application calls on its
//! own timer/task — the same shape the spec's "maintenance loop" and
//! "adaptive sizing" sections describe as periodic passes, just without this
//! crate owning the periodic driver itself.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use asupersync::{CancelReason, Cx, Outcome};
use dbwire_core::error::{ConnectionError, ConnectionErrorKind, PoolError, PoolErrorKind};
use dbwire_core::{Connection, Error};

const IDLE: i8 = 0;
const IN_USE: i8 = 1;
const RESERVED: i8 = -2;
const REMOVED: i8 = -1;

/// A connection factory used by the pool to create new sessions.
///
/// Implemented for any `Fn(&Cx) -> Fut` closure, so callers usually don't
/// need to name this trait directly.
pub trait ConnectionFactory<C: Connection>: Send + Sync {
    /// Create a brand-new connection.
    fn create(&self, cx: &Cx) -> impl Future<Output = Outcome<C, Error>> + Send;
}

impl<C, Func, Fut> ConnectionFactory<C> for Func
where
    C: Connection,
    Func: Fn(&Cx) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<C, Error>> + Send,
{
    fn create(&self, cx: &Cx) -> impl Future<Output = Outcome<C, Error>> + Send {
        self(cx)
    }
}

/// Opaque value threaded from a `before` hook to its matching `after` hook.
pub type HookContext = Box<dyn std::any::Any + Send>;

type BeforeHookFn<C> = dyn Fn(&mut C) -> HookContext + Send + Sync;
type AfterHookFn<C> = dyn Fn(HookContext, &mut C) + Send + Sync;

/// Connection pool configuration.
///
/// Field names and defaults follow the pool's external configuration
/// surface: bounds on size, the various timeouts, and the optional
/// diagnostics knobs (leak detection, adaptive sizing, state logging).
#[derive(Clone)]
pub struct PoolConfig {
    /// Human-readable name used in log lines and leak warnings.
    pub pool_name: String,
    /// Minimum number of connections to maintain (>= 0).
    pub min_connections: usize,
    /// Maximum number of connections allowed (>= `min_connections`).
    pub max_connections: usize,
    /// Maximum time to wait for a connection to become available.
    pub connection_timeout: Duration,
    /// How long an idle connection may sit before eviction.
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection, from creation, before eviction.
    pub max_lifetime: Duration,
    /// Timeout applied to the validation ping/test query.
    pub validation_timeout: Duration,
    /// If set, an `InUse` entry held longer than this emits a leak warning.
    pub leak_detection_threshold: Option<Duration>,
    /// Expected interval between calls to [`Pool::maintain`].
    pub maintenance_interval: Duration,
    /// Whether [`Pool::adaptive_tick`] should grow/shrink the pool.
    pub adaptive_sizing: bool,
    /// Expected interval between calls to [`Pool::adaptive_tick`].
    pub adaptive_interval: Duration,
    /// Validation is skipped if the entry was used within this window.
    pub alive_bypass_window: Duration,
    /// If set (>= 30s), idle entries are proactively pinged past this age.
    pub keepalive_time: Option<Duration>,
    /// Query used for validation instead of `COM_PING`-equivalent, if set.
    pub connection_test_query: Option<String>,
    /// Emit a `tracing::info!` pool-state line on every `maintain` call.
    pub log_pool_state: bool,
    /// Expected interval between pool-state log lines (informational only).
    pub pool_state_log_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_name: "dbwire-pool".to_string(),
            min_connections: 0,
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            validation_timeout: Duration::from_secs(5),
            leak_detection_threshold: None,
            maintenance_interval: Duration::from_secs(30),
            adaptive_sizing: false,
            adaptive_interval: Duration::from_secs(60),
            alive_bypass_window: Duration::from_millis(500),
            keepalive_time: None,
            connection_test_query: None,
            log_pool_state: false,
            pool_state_log_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    #[must_use]
    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, d: Duration) -> Self {
        self.connection_timeout = d;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = d;
        self
    }

    #[must_use]
    pub fn max_lifetime(mut self, d: Duration) -> Self {
        self.max_lifetime = d;
        self
    }

    #[must_use]
    pub fn validation_timeout(mut self, d: Duration) -> Self {
        self.validation_timeout = d;
        self
    }

    #[must_use]
    pub fn leak_detection_threshold(mut self, d: Option<Duration>) -> Self {
        self.leak_detection_threshold = d;
        self
    }

    #[must_use]
    pub fn maintenance_interval(mut self, d: Duration) -> Self {
        self.maintenance_interval = d;
        self
    }

    #[must_use]
    pub fn adaptive_sizing(mut self, enabled: bool) -> Self {
        self.adaptive_sizing = enabled;
        self
    }

    #[must_use]
    pub fn adaptive_interval(mut self, d: Duration) -> Self {
        self.adaptive_interval = d;
        self
    }

    #[must_use]
    pub fn alive_bypass_window(mut self, d: Duration) -> Self {
        self.alive_bypass_window = d;
        self
    }

    #[must_use]
    pub fn keepalive_time(mut self, d: Option<Duration>) -> Self {
        self.keepalive_time = d;
        self
    }

    #[must_use]
    pub fn connection_test_query(mut self, q: Option<String>) -> Self {
        self.connection_test_query = q;
        self
    }

    #[must_use]
    pub fn log_pool_state(mut self, enabled: bool) -> Self {
        self.log_pool_state = enabled;
        self
    }

    #[must_use]
    pub fn pool_state_log_interval(mut self, d: Duration) -> Self {
        self.pool_state_log_interval = d;
        self
    }

    /// Validate the cross-field invariants the spec requires of a config.
    ///
    /// # Errors
    ///
    /// Returns `PoolErrorKind::Config` if `min > max`, any required
    /// duration is zero, or `keepalive_time` is set below 30 seconds.
    pub fn validate(&self) -> Result<(), Error> {
        let fail = |msg: &str| {
            Error::Pool(PoolError {
                kind: PoolErrorKind::Config,
                message: msg.to_string(),
                source: None,
            })
        };
        if self.min_connections > self.max_connections {
            return Err(fail("min_connections must be <= max_connections"));
        }
        if self.connection_timeout.is_zero() {
            return Err(fail("connection_timeout must be > 0"));
        }
        if self.idle_timeout.is_zero() {
            return Err(fail("idle_timeout must be > 0"));
        }
        if self.max_lifetime.is_zero() {
            return Err(fail("max_lifetime must be > 0"));
        }
        if self.validation_timeout.is_zero() {
            return Err(fail("validation_timeout must be > 0"));
        }
        if self.maintenance_interval.is_zero() {
            return Err(fail("maintenance_interval must be > 0"));
        }
        if self.adaptive_interval.is_zero() {
            return Err(fail("adaptive_interval must be > 0"));
        }
        if self.pool_state_log_interval.is_zero() {
            return Err(fail("pool_state_log_interval must be > 0"));
        }
        if let Some(ka) = self.keepalive_time {
            if ka < Duration::from_secs(30) {
                return Err(fail("keepalive_time must be >= 30s when set"));
            }
        }
        Ok(())
    }
}

/// A running mean/max of acquire-to-loan latency, updated lock-free.
#[derive(Debug, Default)]
struct LatencyHistogram {
    count: AtomicU64,
    sum_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyHistogram {
    fn record(&self, d: Duration) {
        let nanos = d.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AcquireLatency {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_nanos.load(Ordering::Relaxed);
        AcquireLatency {
            count,
            mean: if count == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(sum / count)
            },
            max: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Snapshot of the cumulative acquire-latency histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireLatency {
    pub count: u64,
    pub mean: Duration,
    pub max: Duration,
}

/// Pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of entries (idle + active).
    pub total: usize,
    /// Number of idle entries.
    pub idle: usize,
    /// Number of entries currently checked out.
    pub active: usize,
    /// Number of tasks currently waiting in `acquire`.
    pub waiting: usize,
    /// Total number of connections created over the pool's lifetime.
    pub connections_created: u64,
    /// Total number of connections closed (gracefully or on eviction).
    pub connections_closed: u64,
    /// Total number of connections removed due to failed validation.
    pub connections_removed: u64,
    /// Total number of successful acquires.
    pub acquires: u64,
    /// Total number of acquire timeouts.
    pub timeouts: u64,
    /// Cumulative acquire-latency histogram.
    pub acquire_latency: AcquireLatency,
}

/// Whether [`Pool::adaptive_tick`] grew, shrank, or left the pool unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAdjustment {
    Grow,
    Shrink,
    NoChange,
}

#[derive(Default)]
struct StatsInner {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    connections_removed: AtomicU64,
    acquires: AtomicU64,
    timeouts: AtomicU64,
    latency: LatencyHistogram,
}

/// A single slot in the pool's bag.
///
/// The connection itself lives in `conn`, `Some` exactly when the entry is
/// `Idle` (or briefly while being handed off); a borrower takes it out and
/// owns it directly for the duration of the loan, so no lock is held across
/// an `.await` point.
struct PoolEntry<C> {
    id: u64,
    state: AtomicI8,
    conn: Mutex<Option<C>>,
    created_at_nanos: u64,
    last_borrowed_nanos: AtomicU64,
    last_accessed_nanos: AtomicU64,
    borrow_count: AtomicU64,
    leak_warned: AtomicBool,
}

impl<C> PoolEntry<C> {
    fn age(&self, epoch: Instant) -> Duration {
        Duration::from_nanos(now_nanos(epoch).saturating_sub(self.created_at_nanos))
    }

    fn idle_for(&self, epoch: Instant) -> Duration {
        let last = self.last_accessed_nanos.load(Ordering::Acquire);
        Duration::from_nanos(now_nanos(epoch).saturating_sub(last))
    }

    fn held_for(&self, epoch: Instant) -> Duration {
        let last = self.last_borrowed_nanos.load(Ordering::Acquire);
        Duration::from_nanos(now_nanos(epoch).saturating_sub(last))
    }
}

fn now_nanos(epoch: Instant) -> u64 {
    epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64
}

/// The shared bag of entries plus waiter coordination.
struct Bag<C> {
    entries: Mutex<Vec<Arc<PoolEntry<C>>>>,
    handoff: Mutex<VecDeque<Arc<PoolEntry<C>>>>,
    scan_offset: AtomicUsize,
    waiters: AtomicUsize,
    wait_lock: Mutex<()>,
    cv: Condvar,
}

impl<C> Bag<C> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            handoff: Mutex::new(VecDeque::new()),
            scan_offset: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
            wait_lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn notify_all(&self) {
        self.cv.notify_all();
    }

    fn notify_one(&self) {
        self.cv.notify_one();
    }
}

/// Decrements the waiters counter on every exit path, including
/// cancellation — the acquire-is-cancel-safe invariant from the spec.
struct WaiterGuard<'a>(&'a AtomicUsize);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct PoolShared<C: Connection> {
    config: PoolConfig,
    epoch: Instant,
    closed: AtomicBool,
    next_id: AtomicU64,
    pending_creates: AtomicUsize,
    bag: Bag<C>,
    stats: StatsInner,
    before_hook: Option<Box<BeforeHookFn<C>>>,
    after_hook: Option<Box<AfterHookFn<C>>>,
}

impl<C: Connection> PoolShared<C> {
    fn now_nanos(&self) -> u64 {
        now_nanos(self.epoch)
    }

    fn counts(&self) -> (usize, usize, usize) {
        let entries = self.bag.entries.lock().expect("pool lock poisoned");
        let total = entries.len();
        let active = entries
            .iter()
            .filter(|e| {
                let s = e.state.load(Ordering::Acquire);
                s == IN_USE || s == RESERVED
            })
            .count();
        (total, total - active, active)
    }
}

/// A bounded, lock-free-bag connection pool.
///
/// `C` is the pooled connection type; `F` is the factory used to create new
/// connections when the bag is below capacity.
pub struct Pool<C: Connection, F: ConnectionFactory<C>> {
    shared: Arc<PoolShared<C>>,
    factory: F,
}

enum AcquireStep<C> {
    Ready(Arc<PoolEntry<C>>),
    Closed,
    Wait,
}

impl<C: Connection + 'static, F: ConnectionFactory<C>> Pool<C, F> {
    /// Create a new pool. Fails if `config` does not satisfy its invariants.
    ///
    /// # Errors
    ///
    /// Returns `PoolErrorKind::Config` if the configuration is invalid.
    pub fn new(config: PoolConfig, factory: F) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                epoch: Instant::now(),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                pending_creates: AtomicUsize::new(0),
                bag: Bag::new(),
                stats: StatsInner::default(),
                before_hook: None,
                after_hook: None,
            }),
            factory,
        })
    }

    /// Create a pool with before/after acquire-release hooks.
    ///
    /// `before` runs just before a loan is handed to the caller; its return
    /// value is threaded to `after`, which runs as the loan is returned.
    /// Both run synchronously under the exclusive per-entry ownership the
    /// bag already guarantees, so they never race a concurrent borrower of
    /// the same entry.
    ///
    /// # Errors
    ///
    /// Returns `PoolErrorKind::Config` if the configuration is invalid.
    pub fn with_hooks(
        config: PoolConfig,
        factory: F,
        before: impl Fn(&mut C) -> HookContext + Send + Sync + 'static,
        after: impl Fn(HookContext, &mut C) + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                epoch: Instant::now(),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                pending_creates: AtomicUsize::new(0),
                bag: Bag::new(),
                stats: StatsInner::default(),
                before_hook: Some(Box::new(before)),
                after_hook: Some(Box::new(after)),
            }),
            factory,
        })
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Warm the pool up to `min_connections`, creating entries as needed.
    ///
    /// Intended to be called once after construction; also re-run from
    /// inside [`Pool::maintain`] so the bag self-heals after evictions.
    pub async fn warm(&self, cx: &Cx) -> Outcome<(), Error> {
        loop {
            let (total, _, _) = self.shared.counts();
            let pending = self.shared.pending_creates.load(Ordering::Relaxed);
            if total + pending >= self.shared.config.min_connections {
                return Outcome::Ok(());
            }
            match self.create_idle_entry(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
    }

    /// Acquire a connection from the pool.
    ///
    /// 1. Scans the bag round-robin for an `Idle` entry, CAS-ing it to
    ///    `InUse`.
    /// 2. Falls back to the direct handoff queue.
    /// 3. Creates a new entry if the bag is below `max_connections`.
    /// 4. Otherwise waits on the condition variable until a slot frees up
    ///    or `connection_timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `PoolErrorKind::Closed` if the pool is closed, or
    /// `PoolErrorKind::Timeout` if no connection becomes available within
    /// `connection_timeout`.
    pub async fn acquire(&self, cx: &Cx) -> Outcome<PooledConnection<C>, Error> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Outcome::Err(Error::Pool(closed_error()));
        }

        self.shared.bag.waiters.fetch_add(1, Ordering::AcqRel);
        let _waiter_guard = WaiterGuard(&self.shared.bag.waiters);

        let start = Instant::now();
        let deadline = start + self.shared.config.connection_timeout;

        loop {
            if cx.is_cancel_requested() {
                return Outcome::Cancelled(CancelReason::user("pool acquire cancelled"));
            }

            match self.try_step(cx).await {
                AcquireStep::Ready(entry) => {
                    return self.finish_acquire(cx, entry, start).await;
                }
                AcquireStep::Closed => {
                    return Outcome::Err(Error::Pool(closed_error()));
                }
                AcquireStep::Wait => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        self.shared.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                        return Outcome::Err(Error::Pool(timeout_error()));
                    }
                    let wait_for = remaining.min(Duration::from_millis(100));
                    let guard = self.shared.bag.wait_lock.lock().expect("pool lock poisoned");
                    let _ = self.shared.bag.cv.wait_timeout(guard, wait_for);
                }
            }
        }
    }

    /// One non-blocking step of the acquire algorithm: try the bag, then
    /// the handoff queue, then creating a new entry. Returns `Wait` if none
    /// of those succeeded and the caller should park on the condvar.
    async fn try_step(&self, cx: &Cx) -> AcquireStep<C> {
        if self.shared.closed.load(Ordering::Acquire) {
            return AcquireStep::Closed;
        }
        if let Some(entry) = self.scan_idle() {
            return AcquireStep::Ready(entry);
        }
        if let Some(entry) = self.shared.bag.handoff.lock().expect("pool lock poisoned").pop_front() {
            return AcquireStep::Ready(entry);
        }
        if self.reserve_creation_slot() {
            match self.factory.create(cx).await {
                Outcome::Ok(conn) => {
                    let entry = self.push_new_entry(conn, IN_USE);
                    self.shared.pending_creates.fetch_sub(1, Ordering::AcqRel);
                    self.shared
                        .stats
                        .connections_created
                        .fetch_add(1, Ordering::Relaxed);
                    self.shared.bag.notify_one();
                    return AcquireStep::Ready(entry);
                }
                Outcome::Err(_) | Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                    self.shared.pending_creates.fetch_sub(1, Ordering::AcqRel);
                    // Another acquirer may now have room; let the caller
                    // loop back through the wait path rather than
                    // propagating a transient factory failure here.
                }
            }
        }
        AcquireStep::Wait
    }

    fn reserve_creation_slot(&self) -> bool {
        let entries = self.shared.bag.entries.lock().expect("pool lock poisoned");
        let pending = self.shared.pending_creates.load(Ordering::Relaxed);
        if entries.len() + pending < self.shared.config.max_connections {
            self.shared.pending_creates.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    fn push_new_entry(&self, conn: C, state: i8) -> Arc<PoolEntry<C>> {
        let entry = Arc::new(PoolEntry {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            state: AtomicI8::new(state),
            conn: Mutex::new(Some(conn)),
            created_at_nanos: self.shared.now_nanos(),
            last_borrowed_nanos: AtomicU64::new(self.shared.now_nanos()),
            last_accessed_nanos: AtomicU64::new(self.shared.now_nanos()),
            borrow_count: AtomicU64::new(0),
            leak_warned: AtomicBool::new(false),
        });
        self.shared
            .bag
            .entries
            .lock()
            .expect("pool lock poisoned")
            .push(Arc::clone(&entry));
        entry
    }

    /// Create a new idle entry directly (used by `warm`/`adaptive_tick`,
    /// which don't need the created entry handed to a waiter).
    async fn create_idle_entry(&self, cx: &Cx) -> Outcome<(), Error> {
        if !self.reserve_creation_slot() {
            return Outcome::Ok(());
        }
        match self.factory.create(cx).await {
            Outcome::Ok(conn) => {
                self.push_new_entry(conn, IDLE);
                self.shared.pending_creates.fetch_sub(1, Ordering::AcqRel);
                self.shared
                    .stats
                    .connections_created
                    .fetch_add(1, Ordering::Relaxed);
                self.shared.bag.notify_all();
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                self.shared.pending_creates.fetch_sub(1, Ordering::AcqRel);
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                self.shared.pending_creates.fetch_sub(1, Ordering::AcqRel);
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                self.shared.pending_creates.fetch_sub(1, Ordering::AcqRel);
                Outcome::Panicked(p)
            }
        }
    }

    fn scan_idle(&self) -> Option<Arc<PoolEntry<C>>> {
        let entries = self.shared.bag.entries.lock().expect("pool lock poisoned");
        let len = entries.len();
        if len == 0 {
            return None;
        }
        let start = self.shared.bag.scan_offset.fetch_add(1, Ordering::Relaxed) % len;
        for i in 0..len {
            let idx = (start + i) % len;
            let entry = &entries[idx];
            if entry
                .state
                .compare_exchange(IDLE, IN_USE, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(Arc::clone(entry));
            }
        }
        None
    }

    async fn finish_acquire(
        &self,
        cx: &Cx,
        entry: Arc<PoolEntry<C>>,
        start: Instant,
    ) -> Outcome<PooledConnection<C>, Error> {
        let mut conn = match entry.conn.lock().expect("pool lock poisoned").take() {
            Some(c) => c,
            None => {
                // Handoff raced with an eviction between enqueue and pop;
                // the entry is gone. Ask the caller to retry the loop.
                return Outcome::Err(Error::Pool(PoolError {
                    kind: PoolErrorKind::Timeout,
                    message: "pool entry vanished during handoff".to_string(),
                    source: None,
                }));
            }
        };

        let now = self.shared.now_nanos();
        let last_accessed = entry.last_accessed_nanos.load(Ordering::Acquire);
        let bypass_window = self.shared.config.alive_bypass_window.as_nanos() as u64;
        let within_bypass = now.saturating_sub(last_accessed) < bypass_window;

        if !within_bypass {
            let validated = if let Some(query) = &self.shared.config.connection_test_query {
                conn.query(cx, query, &[]).await.map(|_| ())
            } else {
                conn.ping(cx).await
            };
            match validated {
                Outcome::Ok(()) => {}
                Outcome::Err(_) => {
                    self.remove_entry(&entry);
                    self.shared
                        .stats
                        .connections_removed
                        .fetch_add(1, Ordering::Relaxed);
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: "pooled connection failed validation".to_string(),
                        source: None,
                    }));
                }
                Outcome::Cancelled(r) => {
                    // Connection is still good; hand it back to the bag.
                    *entry.conn.lock().expect("pool lock poisoned") = Some(conn);
                    entry.state.store(IDLE, Ordering::Release);
                    self.shared.bag.notify_one();
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    *entry.conn.lock().expect("pool lock poisoned") = Some(conn);
                    entry.state.store(IDLE, Ordering::Release);
                    self.shared.bag.notify_one();
                    return Outcome::Panicked(p);
                }
            }
        }

        let hook_ctx = self.shared.before_hook.as_ref().map(|h| h(&mut conn));

        entry.last_borrowed_nanos.store(now, Ordering::Release);
        entry.borrow_count.fetch_add(1, Ordering::Relaxed);
        entry.leak_warned.store(false, Ordering::Relaxed);

        self.shared.stats.acquires.fetch_add(1, Ordering::Relaxed);
        self.shared.stats.latency.record(start.elapsed());

        Outcome::Ok(PooledConnection {
            entry: Some(entry),
            conn: Some(conn),
            hook_ctx,
            pool: Arc::downgrade(&self.shared),
        })
    }

    fn remove_entry(&self, entry: &Arc<PoolEntry<C>>) {
        entry.state.store(REMOVED, Ordering::Release);
        let mut entries = self.shared.bag.entries.lock().expect("pool lock poisoned");
        entries.retain(|e| e.id != entry.id);
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (total, idle, active) = self.shared.counts();
        PoolStats {
            total,
            idle,
            active,
            waiting: self.shared.bag.waiters.load(Ordering::Relaxed),
            connections_created: self.shared.stats.connections_created.load(Ordering::Relaxed),
            connections_closed: self.shared.stats.connections_closed.load(Ordering::Relaxed),
            connections_removed: self
                .shared
                .stats
                .connections_removed
                .load(Ordering::Relaxed),
            acquires: self.shared.stats.acquires.load(Ordering::Relaxed),
            timeouts: self.shared.stats.timeouts.load(Ordering::Relaxed),
            acquire_latency: self.shared.stats.latency.snapshot(),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Run one maintenance pass: evict expired/idle/over-lifetime entries,
    /// keepalive-ping stale idle entries, warn on leaked loans, and top the
    /// bag back up to `min_connections`.
    ///
    /// Callers are expected to invoke this roughly every
    /// `maintenance_interval`; see the module-level note on why this crate
    /// does not spawn the loop itself.
    pub async fn maintain(&self, cx: &Cx) {
        self.evict_expired_lifetime();
        self.evict_idle_over_timeout();
        self.keepalive_sweep(cx).await;
        self.detect_leaks();
        let _ = self.warm(cx).await;

        if self.shared.config.log_pool_state {
            let stats = self.stats();
            tracing::info!(
                pool = %self.shared.config.pool_name,
                total = stats.total,
                idle = stats.idle,
                active = stats.active,
                waiting = stats.waiting,
                "pool state"
            );
        }
    }

    fn evict_expired_lifetime(&self) {
        let max_lifetime = self.shared.config.max_lifetime;
        let entries: Vec<_> = self
            .shared
            .bag
            .entries
            .lock()
            .expect("pool lock poisoned")
            .clone();
        for entry in entries {
            if entry.age(self.shared.epoch) < max_lifetime {
                continue;
            }
            let state = entry.state.load(Ordering::Acquire);
            if state == IDLE
                && entry
                    .state
                    .compare_exchange(IDLE, REMOVED, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                let _ = entry.conn.lock().expect("pool lock poisoned").take();
                self.remove_entry(&entry);
                self.shared
                    .stats
                    .connections_closed
                    .fetch_add(1, Ordering::Relaxed);
            } else if state == IN_USE {
                // Graceful: let the current borrower finish; release() sees
                // `Reserved` and closes instead of returning it to the bag.
                let _ = entry.state.compare_exchange(
                    IN_USE,
                    RESERVED,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
        }
    }

    fn evict_idle_over_timeout(&self) {
        let idle_timeout = self.shared.config.idle_timeout;
        let min = self.shared.config.min_connections;
        let entries: Vec<_> = self
            .shared
            .bag
            .entries
            .lock()
            .expect("pool lock poisoned")
            .clone();
        for entry in entries {
            let (total, _, _) = self.shared.counts();
            if total <= min {
                break;
            }
            if entry.state.load(Ordering::Acquire) != IDLE {
                continue;
            }
            if entry.idle_for(self.shared.epoch) < idle_timeout {
                continue;
            }
            if entry
                .state
                .compare_exchange(IDLE, REMOVED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let _ = entry.conn.lock().expect("pool lock poisoned").take();
                self.remove_entry(&entry);
                self.shared
                    .stats
                    .connections_closed
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn keepalive_sweep(&self, cx: &Cx) {
        let Some(keepalive) = self.shared.config.keepalive_time else {
            return;
        };
        let entries: Vec<_> = self
            .shared
            .bag
            .entries
            .lock()
            .expect("pool lock poisoned")
            .clone();
        for entry in entries {
            if entry.state.load(Ordering::Acquire) != IDLE {
                continue;
            }
            // +/- 20% jitter, derived from the entry id so the sweep
            // doesn't synchronize every idle connection's ping.
            let jitter_pct = 80 + (entry.id % 41); // 80..=120
            let effective = keepalive.mul_f64(jitter_pct as f64 / 100.0);
            if entry.idle_for(self.shared.epoch) < effective {
                continue;
            }
            if entry
                .state
                .compare_exchange(IDLE, IN_USE, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            let Some(conn) = entry.conn.lock().expect("pool lock poisoned").take() else {
                entry.state.store(IDLE, Ordering::Release);
                continue;
            };
            match conn.ping(cx).await {
                Outcome::Ok(()) => {
                    entry
                        .last_accessed_nanos
                        .store(self.shared.now_nanos(), Ordering::Release);
                    *entry.conn.lock().expect("pool lock poisoned") = Some(conn);
                    entry.state.store(IDLE, Ordering::Release);
                }
                _ => {
                    entry.state.store(REMOVED, Ordering::Release);
                    self.remove_entry(&entry);
                    self.shared
                        .stats
                        .connections_closed
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.shared.bag.notify_all();
    }

    fn detect_leaks(&self) {
        let Some(threshold) = self.shared.config.leak_detection_threshold else {
            return;
        };
        let entries = self.shared.bag.entries.lock().expect("pool lock poisoned");
        for entry in entries.iter() {
            if entry.state.load(Ordering::Acquire) != IN_USE {
                continue;
            }
            if entry.held_for(self.shared.epoch) < threshold {
                continue;
            }
            if entry
                .leak_warned
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                tracing::warn!(
                    pool = %self.shared.config.pool_name,
                    entry_id = entry.id,
                    borrow_count = entry.borrow_count.load(Ordering::Relaxed),
                    held_for_ms = entry.held_for(self.shared.epoch).as_millis(),
                    "possible connection leak: entry held past leak_detection_threshold"
                );
            }
        }
    }

    /// One adaptive-sizing pass: grow by one entry if utilization is
    /// sustained above 80% with waiters present, shrink by one idle entry
    /// if utilization is below 20% and idle count exceeds `min_connections`.
    ///
    /// No-op (returns `NoChange`) unless `adaptive_sizing` is enabled.
    pub async fn adaptive_tick(&self, cx: &Cx) -> PoolAdjustment {
        if !self.shared.config.adaptive_sizing {
            return PoolAdjustment::NoChange;
        }
        let (total, idle, active) = self.shared.counts();
        let waiting = self.shared.bag.waiters.load(Ordering::Relaxed);
        let denom = total.min(self.shared.config.max_connections).max(1);
        let utilization = active as f64 / denom as f64;

        if utilization > 0.8 && waiting > 0 && total < self.shared.config.max_connections {
            match self.create_idle_entry(cx).await {
                Outcome::Ok(()) => PoolAdjustment::Grow,
                _ => PoolAdjustment::NoChange,
            }
        } else if utilization < 0.2 && idle > self.shared.config.min_connections {
            if self.remove_one_idle() {
                PoolAdjustment::Shrink
            } else {
                PoolAdjustment::NoChange
            }
        } else {
            PoolAdjustment::NoChange
        }
    }

    fn remove_one_idle(&self) -> bool {
        let entries: Vec<_> = self
            .shared
            .bag
            .entries
            .lock()
            .expect("pool lock poisoned")
            .clone();
        for entry in entries {
            if entry
                .state
                .compare_exchange(IDLE, REMOVED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let _ = entry.conn.lock().expect("pool lock poisoned").take();
                self.remove_entry(&entry);
                self.shared
                    .stats
                    .connections_closed
                    .fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Close the pool: halts new acquires, wakes every waiter (who will
    /// observe `PoolClosed`), and closes all currently-idle entries.
    /// Entries that are `InUse` are closed as their loans are released.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.bag.notify_all();

        let mut entries = self.shared.bag.entries.lock().expect("pool lock poisoned");
        let mut closed = 0u64;
        for entry in entries.iter() {
            if entry
                .state
                .compare_exchange(IDLE, REMOVED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let _ = entry.conn.lock().expect("pool lock poisoned").take();
                closed += 1;
            }
        }
        entries.retain(|e| e.state.load(Ordering::Acquire) != REMOVED);
        drop(entries);
        self.shared
            .stats
            .connections_closed
            .fetch_add(closed, Ordering::Relaxed);
        self.shared.bag.handoff.lock().expect("pool lock poisoned").clear();
    }
}

fn closed_error() -> PoolError {
    PoolError {
        kind: PoolErrorKind::Closed,
        message: "pool has been closed".to_string(),
        source: None,
    }
}

fn timeout_error() -> PoolError {
    PoolError {
        kind: PoolErrorKind::Timeout,
        message: "acquire timeout: no connections available".to_string(),
        source: None,
    }
}

/// A connection borrowed from the pool.
///
/// Returned to the pool on `Drop`. Dropping twice is impossible in safe
/// Rust, and [`PooledConnection::detach`] leaves the fields empty so a
/// subsequent `Drop` is a no-op — the scoped loan can only ever be released
/// once.
pub struct PooledConnection<C: Connection> {
    entry: Option<Arc<PoolEntry<C>>>,
    conn: Option<C>,
    hook_ctx: Option<HookContext>,
    pool: Weak<PoolShared<C>>,
}

impl<C: Connection> PooledConnection<C> {
    /// Detach this connection from the pool permanently.
    ///
    /// The entry is marked removed and the underlying connection is handed
    /// to the caller instead of being returned to the bag when this value
    /// drops.
    pub fn detach(mut self) -> C {
        if let (Some(pool), Some(entry)) = (self.pool.upgrade(), self.entry.take()) {
            entry.state.store(REMOVED, Ordering::Release);
            let mut entries = pool.bag.entries.lock().expect("pool lock poisoned");
            entries.retain(|e| e.id != entry.id);
            drop(entries);
            pool.stats
                .connections_closed
                .fetch_add(1, Ordering::Relaxed);
        }
        self.conn.take().expect("connection already detached")
    }

    /// Age of the underlying connection since it was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        let Some(pool) = self.pool.upgrade() else {
            return Duration::ZERO;
        };
        self.entry
            .as_ref()
            .map_or(Duration::ZERO, |e| e.age(pool.epoch))
    }

    /// How many times this entry has been borrowed over its lifetime.
    #[must_use]
    pub fn borrow_count(&self) -> u64 {
        self.entry
            .as_ref()
            .map_or(0, |e| e.borrow_count.load(Ordering::Relaxed))
    }
}

impl<C: Connection> std::ops::Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned to pool")
    }
}

impl<C: Connection> std::ops::DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("connection already returned to pool")
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let (Some(entry), Some(mut conn)) = (self.entry.take(), self.conn.take()) else {
            return;
        };
        let Some(pool) = self.pool.upgrade() else {
            return;
        };

        if let Some(after) = &pool.after_hook {
            after(self.hook_ctx.take().unwrap_or_else(|| Box::new(())), &mut conn);
        }

        let now = now_nanos(pool.epoch);
        entry.last_accessed_nanos.store(now, Ordering::Release);

        let closed = pool.closed.load(Ordering::Acquire);
        let state = entry.state.load(Ordering::Acquire);

        if closed || state == RESERVED {
            entry.state.store(REMOVED, Ordering::Release);
            let mut entries = pool.bag.entries.lock().expect("pool lock poisoned");
            entries.retain(|e| e.id != entry.id);
            drop(entries);
            pool.stats
                .connections_closed
                .fetch_add(1, Ordering::Relaxed);
            drop(conn);
            pool.bag.notify_all();
            return;
        }

        *entry.conn.lock().expect("pool lock poisoned") = Some(conn);

        if pool.bag.waiters.load(Ordering::Relaxed) > 0 {
            pool.bag
                .handoff
                .lock()
                .expect("pool lock poisoned")
                .push_back(entry);
        } else {
            entry.state.store(IDLE, Ordering::Release);
        }
        pool.bag.notify_one();
    }
}

impl<C: Connection + std::fmt::Debug> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_core::connection::{IsolationLevel, PreparedStatement, TransactionOps};
    use dbwire_core::{Row, Value};
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    #[derive(Debug)]
    struct MockConnection {
        id: u32,
        ping_should_fail: Arc<StdAtomicBool>,
    }

    impl MockConnection {
        fn new(id: u32) -> Self {
            Self {
                id,
                ping_should_fail: Arc::new(StdAtomicBool::new(false)),
            }
        }
    }

    struct MockTx;

    impl TransactionOps for MockTx {
        fn query(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(vec![]) }
        }
        fn query_one(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
            async { Outcome::Ok(None) }
        }
        fn execute(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }
        fn savepoint(&self, _cx: &Cx, _name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
        fn rollback_to(
            &self,
            _cx: &Cx,
            _name: &str,
        ) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
        fn release(&self, _cx: &Cx, _name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
        fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
        fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
    }

    impl Connection for MockConnection {
        type Tx<'conn> = MockTx;

        fn query(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(vec![]) }
        }
        fn query_one(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
            async { Outcome::Ok(None) }
        }
        fn execute(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }
        fn insert(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<i64, Error>> + Send {
            async { Outcome::Ok(0) }
        }
        fn batch(
            &self,
            _cx: &Cx,
            _statements: &[(String, Vec<Value>)],
        ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
            async { Outcome::Ok(vec![]) }
        }
        fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
            async { Outcome::Ok(MockTx) }
        }
        fn begin_with(
            &self,
            _cx: &Cx,
            _isolation: IsolationLevel,
        ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
            async { Outcome::Ok(MockTx) }
        }
        fn prepare(
            &self,
            _cx: &Cx,
            _sql: &str,
        ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
            async { Outcome::Ok(PreparedStatement::new(1, String::new(), 0)) }
        }
        fn query_prepared(
            &self,
            _cx: &Cx,
            _stmt: &PreparedStatement,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(vec![]) }
        }
        fn execute_prepared(
            &self,
            _cx: &Cx,
            _stmt: &PreparedStatement,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }
        fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            let should_fail = self.ping_should_fail.load(Ordering::Relaxed);
            async move {
                if should_fail {
                    Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: "mock ping failed".to_string(),
                        source: None,
                    }))
                } else {
                    Outcome::Ok(())
                }
            }
        }
        fn close(self, _cx: &Cx) -> impl Future<Output = dbwire_core::error::Result<()>> + Send {
            async { Ok(()) }
        }
    }

    fn test_cx() -> Cx {
        Cx::for_testing()
    }

    fn counter_factory() -> (impl Fn(&Cx) -> std::future::Ready<Outcome<MockConnection, Error>>, Arc<AtomicU64>) {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let factory = move |_cx: &Cx| {
            let id = c.fetch_add(1, Ordering::Relaxed) as u32;
            std::future::ready(Outcome::Ok(MockConnection::new(id)))
        };
        (factory, counter)
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("runtime");
        rt.block_on(fut)
    }

    #[test]
    fn test_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.max_connections, 10);
        assert!(!config.adaptive_sizing);
        assert!(config.keepalive_time.is_none());
    }

    #[test]
    fn test_config_validate_min_gt_max() {
        let config = PoolConfig::new(2).min_connections(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_keepalive_too_short() {
        let config = PoolConfig::new(2).keepalive_time(Some(Duration::from_secs(1)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_ok() {
        let config = PoolConfig::new(4).min_connections(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_new_empty() {
        let (factory, _) = counter_factory();
        let pool = Pool::new(PoolConfig::new(5), factory).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.active, 0);
        assert!(!pool.is_closed());
    }

    #[test]
    fn test_acquire_creates_new_when_below_max() {
        let (factory, created) = counter_factory();
        let pool = Pool::new(PoolConfig::new(5), factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx));
        let conn = conn.unwrap();
        assert_eq!(created.load(Ordering::Relaxed), 1);
        let stats = pool.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 0);
        drop(conn);
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn test_acquire_reuses_idle_entry() {
        let (factory, created) = counter_factory();
        let pool = Pool::new(PoolConfig::new(5), factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        drop(conn);
        let _conn2 = block_on(pool.acquire(&cx)).unwrap();
        assert_eq!(created.load(Ordering::Relaxed), 1);
        assert_eq!(pool.stats().total, 1);
    }

    #[test]
    fn test_acquire_timeout_when_at_capacity() {
        let (factory, _) = counter_factory();
        let config = PoolConfig::new(1).connection_timeout(Duration::from_millis(50));
        let pool = Pool::new(config, factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        let result = block_on(pool.acquire(&cx));
        match result {
            Outcome::Err(Error::Pool(e)) => assert_eq!(e.kind, PoolErrorKind::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
        drop(conn);
    }

    #[test]
    fn test_pool_bounds_active_plus_idle_equals_total() {
        let (factory, _) = counter_factory();
        let pool = Pool::new(PoolConfig::new(3), factory).unwrap();
        let cx = test_cx();
        let a = block_on(pool.acquire(&cx)).unwrap();
        let b = block_on(pool.acquire(&cx)).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.active + stats.idle, stats.total);
        assert_eq!(stats.active, 2);
        drop(a);
        drop(b);
        let stats = pool.stats();
        assert_eq!(stats.active + stats.idle, stats.total);
        assert_eq!(stats.idle, 2);
    }

    #[test]
    fn test_detach_removes_from_pool() {
        let (factory, _) = counter_factory();
        let pool = Pool::new(PoolConfig::new(3), factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        let id = conn.id;
        let raw = conn.detach();
        assert_eq!(raw.id, id);
        assert_eq!(pool.stats().total, 0);
        assert_eq!(pool.stats().connections_closed, 1);
    }

    #[test]
    fn test_close_clears_idle_and_blocks_new_acquires() {
        let (factory, _) = counter_factory();
        let pool = Pool::new(PoolConfig::new(3), factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        drop(conn);
        assert_eq!(pool.stats().idle, 1);
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.stats().total, 0);
        let result = block_on(pool.acquire(&cx));
        match result {
            Outcome::Err(Error::Pool(e)) => assert_eq!(e.kind, PoolErrorKind::Closed),
            other => panic!("expected closed error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_failure_removes_and_errors() {
        let should_fail = Arc::new(StdAtomicBool::new(false));
        let sf = Arc::clone(&should_fail);
        let factory = move |_cx: &Cx| {
            let conn = MockConnection {
                id: 1,
                ping_should_fail: Arc::clone(&sf),
            };
            std::future::ready(Outcome::Ok(conn))
        };
        let config = PoolConfig::new(2).alive_bypass_window(Duration::ZERO);
        let pool = Pool::new(config, factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        drop(conn);
        should_fail.store(true, Ordering::Relaxed);
        let result = block_on(pool.acquire(&cx));
        assert!(matches!(result, Outcome::Err(Error::Connection(_))));
        assert_eq!(pool.stats().connections_removed, 1);
        assert_eq!(pool.stats().total, 0);
    }

    #[test]
    fn test_maintain_evicts_idle_over_timeout() {
        let (factory, _) = counter_factory();
        let config = PoolConfig::new(3).idle_timeout(Duration::from_millis(1));
        let pool = Pool::new(config, factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        drop(conn);
        std::thread::sleep(Duration::from_millis(5));
        block_on(pool.maintain(&cx));
        assert_eq!(pool.stats().total, 0);
        assert_eq!(pool.stats().connections_closed, 1);
    }

    #[test]
    fn test_maintain_warms_to_min() {
        let (factory, created) = counter_factory();
        let config = PoolConfig::new(4).min_connections(2);
        let pool = Pool::new(config, factory).unwrap();
        let cx = test_cx();
        block_on(pool.maintain(&cx));
        assert_eq!(created.load(Ordering::Relaxed), 2);
        assert_eq!(pool.stats().total, 2);
        assert_eq!(pool.stats().idle, 2);
    }

    #[test]
    fn test_leak_detection_warns_once() {
        let (factory, _) = counter_factory();
        let config = PoolConfig::new(2).leak_detection_threshold(Some(Duration::from_millis(1)));
        let pool = Pool::new(config, factory).unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        block_on(pool.maintain(&cx));
        // Second pass should not warn again (leak_warned latched); nothing
        // observable externally besides not panicking, so this just
        // exercises the code path without re-acquiring.
        block_on(pool.maintain(&cx));
        drop(conn);
    }

    #[test]
    fn test_adaptive_tick_noop_when_disabled() {
        let (factory, _) = counter_factory();
        let pool = Pool::new(PoolConfig::new(3), factory).unwrap();
        let cx = test_cx();
        let adj = block_on(pool.adaptive_tick(&cx));
        assert_eq!(adj, PoolAdjustment::NoChange);
    }

    #[test]
    fn test_adaptive_tick_grows_under_pressure() {
        let (factory, _) = counter_factory();
        let config = PoolConfig::new(4).adaptive_sizing(true);
        let pool = Pool::new(config, factory).unwrap();
        let cx = test_cx();
        let _a = block_on(pool.acquire(&cx)).unwrap();
        pool.shared.bag.waiters.fetch_add(1, Ordering::Relaxed);
        let adj = block_on(pool.adaptive_tick(&cx));
        assert_eq!(adj, PoolAdjustment::Grow);
        pool.shared.bag.waiters.fetch_sub(1, Ordering::Relaxed);
    }

    #[test]
    fn test_with_hooks_threads_context() {
        let (factory, _) = counter_factory();
        let before_calls = Arc::new(AtomicU64::new(0));
        let after_calls = Arc::new(AtomicU64::new(0));
        let bc = Arc::clone(&before_calls);
        let ac = Arc::clone(&after_calls);
        let pool = Pool::with_hooks(
            PoolConfig::new(2),
            factory,
            move |_conn: &mut MockConnection| {
                bc.fetch_add(1, Ordering::Relaxed);
                Box::new(42u32) as HookContext
            },
            move |ctx: HookContext, _conn: &mut MockConnection| {
                let value = *ctx.downcast::<u32>().unwrap();
                assert_eq!(value, 42);
                ac.fetch_add(1, Ordering::Relaxed);
            },
        )
        .unwrap();
        let cx = test_cx();
        let conn = block_on(pool.acquire(&cx)).unwrap();
        assert_eq!(before_calls.load(Ordering::Relaxed), 1);
        drop(conn);
        assert_eq!(after_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_pool_adjustment_eq() {
        assert_eq!(PoolAdjustment::Grow, PoolAdjustment::Grow);
        assert_ne!(PoolAdjustment::Grow, PoolAdjustment::Shrink);
    }
}
