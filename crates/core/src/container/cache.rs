//! Per-scope instance cache with eviction strategies

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ConfigError;
use crate::container::autowiring::Instance;
use crate::container::descriptor::TypeKey;
use crate::errors::BoxError;

/// Cleanup hook run once when an instance leaves the cache
pub type Teardown = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Predicate deciding on purge whether an instance should be evicted
pub type EvictionPredicate = Arc<dyn Fn(&Instance) -> Result<bool, BoxError> + Send + Sync>;

/// Lifetime policy applied when an instance is stored
#[derive(Clone, Default)]
pub enum CacheStrategy {
    /// Kept until the scope is cleared or destroyed
    #[default]
    Persistent,
    /// Never stored; every resolution constructs
    NoCache,
    /// Stored without holding the instance alive
    WeakReference,
    /// Evicted after the given idle period; every hit restarts the period
    Idle(Duration),
    /// Evicted on purge when the predicate returns true
    Conditional(EvictionPredicate),
}

impl CacheStrategy {
    /// Create a conditional strategy from a predicate
    pub fn conditional<F>(predicate: F) -> Self
    where
        F: Fn(&Instance) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        CacheStrategy::Conditional(Arc::new(predicate))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::Persistent => "persistent",
            CacheStrategy::NoCache => "no-cache",
            CacheStrategy::WeakReference => "weak-reference",
            CacheStrategy::Idle(_) => "idle",
            CacheStrategy::Conditional(_) => "conditional",
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, CacheStrategy::Persistent)
    }
}

impl fmt::Debug for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::Idle(timeout) => write!(f, "Idle({:?})", timeout),
            CacheStrategy::Conditional(_) => write!(f, "Conditional(<predicate>)"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::Idle(timeout) => write!(f, "idle:{}", timeout.as_millis()),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for CacheStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "persistent" => Ok(CacheStrategy::Persistent),
            "no-cache" => Ok(CacheStrategy::NoCache),
            "weak-reference" => Ok(CacheStrategy::WeakReference),
            _ => {
                let millis = value
                    .strip_prefix("idle:")
                    .and_then(|ms| ms.parse::<u64>().ok())
                    .ok_or_else(|| {
                        ConfigError::invalid_value(
                            "default_cache_strategy",
                            s,
                            "persistent, no-cache, weak-reference or idle:<ms>",
                        )
                    })?;
                Ok(CacheStrategy::Idle(Duration::from_millis(millis)))
            }
        }
    }
}

enum Slot {
    Strong(Instance),
    Weak(Weak<dyn Any + Send + Sync>),
}

impl Slot {
    fn live(&self) -> Option<Instance> {
        match self {
            Slot::Strong(instance) => Some(instance.clone()),
            Slot::Weak(weak) => weak.upgrade(),
        }
    }
}

struct IdleTimer {
    timeout: Duration,
    deadline: Instant,
    handle: Option<JoinHandle<()>>,
}

impl IdleTimer {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct CacheEntry {
    slot: Slot,
    teardown: Option<Teardown>,
    idle: Option<IdleTimer>,
    predicate: Option<EvictionPredicate>,
}

/// An entry taken out of the cache whose cleanup hook has not run yet
struct Detached {
    key: TypeKey,
    instance: Option<Instance>,
    teardown: Option<Teardown>,
}

impl Detached {
    fn finish(self) {
        if let (Some(teardown), Some(instance)) = (self.teardown, self.instance) {
            teardown(&instance);
        }
        tracing::trace!("Evicted cached instance of {}", self.key);
    }
}

fn finish_all(detached: Vec<Detached>) {
    for entry in detached {
        entry.finish();
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<TypeKey, CacheEntry>,
}

impl CacheState {
    /// Remove the entry and stop its timer; the hook runs once the lock is released
    fn detach(&mut self, key: &TypeKey) -> Option<Detached> {
        let mut entry = self.entries.remove(key)?;
        if let Some(timer) = entry.idle.as_mut() {
            timer.cancel();
        }
        Some(Detached {
            key: *key,
            instance: entry.slot.live(),
            teardown: entry.teardown,
        })
    }

    fn is_expired(&self, key: &TypeKey, now: Instant) -> bool {
        self.entries
            .get(key)
            .and_then(|entry| entry.idle.as_ref())
            .map_or(false, |timer| timer.deadline <= now)
    }
}

impl Drop for CacheState {
    fn drop(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(timer) = entry.idle.as_mut() {
                timer.cancel();
            }
        }
    }
}

/// Instance cache owned by one scope
///
/// An entry is removed under the lock and its cleanup hook runs after the
/// lock is released, so a hook may resolve from the same scope.
#[derive(Clone, Default)]
pub struct InstanceCache {
    state: Arc<Mutex<CacheState>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached instance
    ///
    /// A dead weak reference or an expired idle entry is a miss. A hit on an
    /// idle entry restarts its idle period.
    pub fn resolve(&self, key: &TypeKey) -> Option<Instance> {
        let weak_state = Arc::downgrade(&self.state);
        let mut state = self.state.lock();
        let now = Instant::now();

        if state.is_expired(key, now) {
            let expired = state.detach(key);
            drop(state);
            if let Some(entry) = expired {
                entry.finish();
            }
            return None;
        }

        let entry = state.entries.get_mut(key)?;
        let instance = entry.slot.live()?;

        if let Some(timer) = entry.idle.as_mut() {
            timer.cancel();
            timer.deadline = now + timer.timeout;
            timer.handle = schedule_eviction(weak_state, *key, timer.deadline);
        }

        Some(instance)
    }

    /// Store `instance` under `key` according to `strategy`
    ///
    /// Replacing a different instance evicts the previous one first, running
    /// its cleanup hook.
    pub fn update(
        &self,
        key: TypeKey,
        instance: Instance,
        strategy: &CacheStrategy,
        teardown: Option<Teardown>,
    ) {
        if matches!(strategy, CacheStrategy::NoCache) {
            return;
        }

        let weak_state = Arc::downgrade(&self.state);
        let mut state = self.state.lock();

        let previous = state.entries.get(&key).and_then(|entry| entry.slot.live());
        let replaced = match previous {
            Some(previous) if !Arc::ptr_eq(&previous, &instance) => state.detach(&key),
            _ => {
                if let Some(timer) = state.entries.get_mut(&key).and_then(|e| e.idle.as_mut()) {
                    timer.cancel();
                }
                None
            }
        };

        let slot = match strategy {
            CacheStrategy::WeakReference => Slot::Weak(Arc::downgrade(&instance)),
            _ => Slot::Strong(instance),
        };

        let idle = match strategy {
            CacheStrategy::Idle(timeout) => {
                let deadline = Instant::now() + *timeout;
                Some(IdleTimer {
                    timeout: *timeout,
                    deadline,
                    handle: schedule_eviction(weak_state, key, deadline),
                })
            }
            _ => None,
        };

        let predicate = match strategy {
            CacheStrategy::Conditional(predicate) => Some(predicate.clone()),
            _ => None,
        };

        state.entries.insert(
            key,
            CacheEntry {
                slot,
                teardown,
                idle,
                predicate,
            },
        );
        drop(state);

        tracing::trace!("Cached instance of {} ({})", key, strategy);
        if let Some(entry) = replaced {
            entry.finish();
        }
    }

    /// Evict one entry, running its cleanup hook
    pub fn evict(&self, key: &TypeKey) -> bool {
        let detached = self.state.lock().detach(key);
        match detached {
            Some(entry) => {
                entry.finish();
                true
            }
            None => false,
        }
    }

    /// Evict every entry, running cleanup hooks
    pub fn clear(&self) {
        let mut detached = Vec::new();
        {
            let mut state = self.state.lock();
            let keys: Vec<TypeKey> = state.entries.keys().copied().collect();
            for key in keys {
                detached.extend(state.detach(&key));
            }
        }
        finish_all(detached);
    }

    /// Evaluate conditional predicates and drop dead or expired entries
    ///
    /// A failing predicate is logged and the instance is kept.
    pub fn purge(&self) {
        let (stale, candidates): (Vec<Detached>, Vec<(TypeKey, Instance, EvictionPredicate)>) = {
            let mut state = self.state.lock();
            let now = Instant::now();

            let keys: Vec<TypeKey> = state
                .entries
                .iter()
                .filter(|(key, entry)| entry.slot.live().is_none() || state.is_expired(key, now))
                .map(|(key, _)| *key)
                .collect();
            let stale: Vec<Detached> = keys.iter().filter_map(|key| state.detach(key)).collect();

            let candidates = state
                .entries
                .iter()
                .filter_map(|(key, entry)| {
                    let predicate = entry.predicate.clone()?;
                    let instance = entry.slot.live()?;
                    Some((*key, instance, predicate))
                })
                .collect();
            (stale, candidates)
        };
        finish_all(stale);

        let mut doomed = Vec::new();
        for (key, instance, predicate) in candidates {
            match predicate(&instance) {
                Ok(true) => doomed.push((key, instance)),
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!("Error evaluating eviction predicate for {}: {}", key, error);
                }
            }
        }

        let mut evicted = Vec::new();
        {
            let mut state = self.state.lock();
            for (key, instance) in doomed {
                let unchanged = state
                    .entries
                    .get(&key)
                    .and_then(|entry| entry.slot.live())
                    .map_or(false, |current| Arc::ptr_eq(&current, &instance));
                if unchanged {
                    evicted.extend(state.detach(&key));
                }
            }
        }
        finish_all(evicted);
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Every live instance currently cached
    pub fn instances(&self) -> Vec<Instance> {
        self.state
            .lock()
            .entries
            .values()
            .filter_map(|entry| entry.slot.live())
            .collect()
    }

    /// Number of entries, including weak entries not yet purged
    pub fn instance_count(&self) -> usize {
        self.state.lock().entries.len()
    }
}

impl fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("instance_count", &self.instance_count())
            .finish()
    }
}

fn schedule_eviction(
    state: Weak<Mutex<CacheState>>,
    key: TypeKey,
    deadline: Instant,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(
            "No async runtime available to schedule idle eviction of {}; expiry is checked on access",
            key
        );
        return None;
    };

    Some(runtime.spawn(async move {
        tokio::time::sleep_until(deadline).await;

        let Some(state) = state.upgrade() else {
            return;
        };
        let expired = {
            let mut state = state.lock();
            if !state.is_expired(&key, Instant::now()) {
                return;
            }
            if let Some(timer) = state.entries.get_mut(&key).and_then(|e| e.idle.as_mut()) {
                timer.handle = None;
            }
            state.detach(&key)
        };
        if let Some(entry) = expired {
            entry.finish();
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Connection;

    fn key() -> TypeKey {
        TypeKey::of::<Connection>()
    }

    fn counting_teardown(counter: &Arc<AtomicUsize>) -> Teardown {
        let counter = counter.clone();
        Arc::new(move |_instance: &Instance| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_persistent_returns_same_instance() {
        let cache = InstanceCache::new();
        let instance: Instance = Arc::new(Connection);
        cache.update(key(), instance.clone(), &CacheStrategy::Persistent, None);

        let resolved = cache.resolve(&key()).unwrap();
        assert!(Arc::ptr_eq(&resolved, &instance));
        assert_eq!(cache.instance_count(), 1);
    }

    #[test]
    fn test_no_cache_stores_nothing() {
        let cache = InstanceCache::new();
        cache.update(key(), Arc::new(Connection), &CacheStrategy::NoCache, None);

        assert!(cache.resolve(&key()).is_none());
        assert_eq!(cache.instance_count(), 0);
    }

    #[test]
    fn test_weak_reference_misses_after_release() {
        let cache = InstanceCache::new();
        let instance: Instance = Arc::new(Connection);
        cache.update(key(), instance.clone(), &CacheStrategy::WeakReference, None);

        assert!(cache.resolve(&key()).is_some());
        drop(instance);
        assert!(cache.resolve(&key()).is_none());

        cache.purge();
        assert_eq!(cache.instance_count(), 0);
    }

    #[test]
    fn test_replacing_instance_tears_down_previous_once() {
        let cache = InstanceCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let first: Instance = Arc::new(Connection);

        cache.update(key(), first.clone(), &CacheStrategy::Persistent, Some(counting_teardown(&counter)));
        cache.update(key(), first.clone(), &CacheStrategy::Persistent, Some(counting_teardown(&counter)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        cache.update(key(), Arc::new(Connection), &CacheStrategy::Persistent, Some(counting_teardown(&counter)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.instance_count(), 1);
    }

    #[test]
    fn test_clear_runs_each_teardown_once() {
        let cache = InstanceCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        cache.update(key(), Arc::new(Connection), &CacheStrategy::Persistent, Some(counting_teardown(&counter)));
        cache.update(TypeKey::of::<String>(), Arc::new(String::new()), &CacheStrategy::Persistent, Some(counting_teardown(&counter)));

        cache.clear();
        cache.clear();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.instance_count(), 0);
    }

    #[test]
    fn test_teardown_may_reenter_cache() {
        let cache = InstanceCache::new();
        let reentrant = cache.clone();
        let teardown: Teardown = Arc::new(move |_instance: &Instance| {
            assert!(!reentrant.contains(&key()));
            reentrant.update(
                TypeKey::of::<String>(),
                Arc::new(String::from("replacement")),
                &CacheStrategy::Persistent,
                None,
            );
        });
        cache.update(key(), Arc::new(Connection), &CacheStrategy::Persistent, Some(teardown));

        assert!(cache.evict(&key()));
        assert!(!cache.evict(&key()));
        assert!(cache.contains(&TypeKey::of::<String>()));
    }

    #[test]
    fn test_conditional_evicts_on_purge_only() {
        let cache = InstanceCache::new();
        let strategy = CacheStrategy::conditional(|_instance| Ok(true));
        cache.update(key(), Arc::new(Connection), &strategy, None);

        assert!(cache.resolve(&key()).is_some());
        cache.purge();
        assert!(cache.resolve(&key()).is_none());
    }

    #[test]
    fn test_failing_predicate_keeps_instance() {
        let cache = InstanceCache::new();
        let strategy = CacheStrategy::conditional(|_instance| Err("predicate exploded".into()));
        cache.update(key(), Arc::new(Connection), &strategy, None);

        cache.purge();
        assert!(cache.resolve(&key()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_eviction_is_sliding() {
        let cache = InstanceCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let strategy = CacheStrategy::Idle(Duration::from_millis(100));
        cache.update(key(), Arc::new(Connection), &strategy, Some(counting_teardown(&counter)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.resolve(&key()).is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.resolve(&key()).is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!cache.contains(&key()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_expiry_without_runtime_is_checked_on_access() {
        let cache = InstanceCache::new();
        cache.update(key(), Arc::new(Connection), &CacheStrategy::Idle(Duration::from_millis(1)), None);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.resolve(&key()).is_none());
    }

    #[test]
    fn test_parse_strategies() {
        assert!("persistent".parse::<CacheStrategy>().unwrap().is_persistent());
        assert!(matches!("no-cache".parse::<CacheStrategy>().unwrap(), CacheStrategy::NoCache));
        assert!(matches!(
            "idle:250".parse::<CacheStrategy>().unwrap(),
            CacheStrategy::Idle(timeout) if timeout == Duration::from_millis(250)
        ));
        assert!("forever".parse::<CacheStrategy>().is_err());
    }
}
