//! On-demand plane cache with soft retention.
//!
//! [`PlaneCache`] materializes planes through an injected loader and keeps
//! them under an explicit, testable retention policy: a strong LRU bound
//! (the stand-in for the host's memory-pressure signal) plus a weak side
//! table, so a plane evicted while a caller still holds it is resurrected
//! instead of re-loaded. At most one load runs per key at any time; callers
//! for the same key block and all receive the same buffer. Loads for
//! different keys run fully in parallel — no lock is held across a loader
//! call.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::plane::{PlaneBuffer, WeakPlaneBuffer};

/// A plane failed to load.
///
/// Delivered to every caller blocked on the key. The cache does not retain
/// the failure; the next `get` for the key runs the loader again.
#[derive(Clone, Debug)]
pub struct PlaneLoadError {
    index: usize,
    source: Arc<dyn core::error::Error + Send + Sync>,
}

impl PlaneLoadError {
    /// Wrap a loader failure for plane `index`.
    pub fn new(
        index: usize,
        source: impl Into<Box<dyn core::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            index,
            source: Arc::from(source.into()),
        }
    }

    /// The plane index that failed.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl core::fmt::Display for PlaneLoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "plane {} failed to load: {}", self.index, self.source)
    }
}

impl core::error::Error for PlaneLoadError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&*self.source)
    }
}

type Loader = Box<dyn Fn(usize) -> Result<PlaneBuffer, PlaneLoadError> + Send + Sync>;

/// Keyed cache from plane index to [`PlaneBuffer`].
pub struct PlaneCache {
    loader: Loader,
    capacity: Option<usize>,
    inner: Mutex<Inner>,
}

struct Inner {
    ready: HashMap<usize, PlaneBuffer>,
    /// LRU order over `ready`, least recently used first.
    order: Vec<usize>,
    /// Evicted-but-possibly-alive planes.
    weak: HashMap<usize, WeakPlaneBuffer>,
    loading: HashMap<usize, Arc<InFlight>>,
}

struct InFlight {
    outcome: Mutex<Option<Result<PlaneBuffer, PlaneLoadError>>>,
    done: Condvar,
}

impl PlaneCache {
    /// Unbounded cache over a loader.
    pub fn new(
        loader: impl Fn(usize) -> Result<PlaneBuffer, PlaneLoadError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            loader: Box::new(loader),
            capacity: None,
            inner: Mutex::new(Inner {
                ready: HashMap::new(),
                order: Vec::new(),
                weak: HashMap::new(),
                loading: HashMap::new(),
            }),
        }
    }

    /// Bound the number of strongly retained planes.
    ///
    /// Exceeding the bound evicts the least recently used plane. This is
    /// the deterministic stand-in for a memory-pressure signal; evicted
    /// planes still referenced elsewhere remain recoverable through the
    /// weak table.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// The strong retention bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of strongly retained planes.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    /// Whether no plane is strongly retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `index` is strongly retained right now.
    pub fn contains(&self, index: usize) -> bool {
        self.lock().ready.contains_key(&index)
    }

    /// Fetch a plane, loading it on miss.
    ///
    /// Blocks while another caller is loading the same key and then
    /// returns that caller's outcome — the same buffer on success, the
    /// same failure otherwise. Never returns a partially written buffer:
    /// a plane becomes visible only after its loader returned.
    pub fn get(&self, index: usize) -> Result<PlaneBuffer, PlaneLoadError> {
        let flight = {
            let mut inner = self.lock();
            if let Some(buf) = inner.ready.get(&index).cloned() {
                touch(&mut inner.order, index);
                return Ok(buf);
            }
            if let Some(buf) = inner.weak.get(&index).and_then(WeakPlaneBuffer::upgrade) {
                inner.ready.insert(index, buf.clone());
                touch(&mut inner.order, index);
                self.evict_over_capacity(&mut inner);
                return Ok(buf);
            }
            match inner.loading.get(&index).map(Arc::clone) {
                Some(flight) => flight,
                None => {
                    let flight = Arc::new(InFlight {
                        outcome: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    inner.loading.insert(index, Arc::clone(&flight));
                    drop(inner);
                    return self.run_loader(index, &flight);
                }
            }
        };
        // Someone else is loading this key; wait for their outcome.
        let mut outcome = flight
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*outcome {
                Some(result) => return result.clone(),
                None => {
                    outcome = flight
                        .done
                        .wait(outcome)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Drop the strong retention of one plane.
    ///
    /// The plane stays recoverable through the weak table while any caller
    /// still holds it. Returns whether the plane was strongly retained.
    pub fn evict(&self, index: usize) -> bool {
        let mut inner = self.lock();
        touch_remove(&mut inner.order, index);
        inner.ready.remove(&index).is_some()
    }

    /// Forget one plane entirely: strong retention and weak recovery.
    ///
    /// The next `get` for the key runs the loader even if stale handles to
    /// the old buffer are still alive. Used after write-back.
    pub fn invalidate(&self, index: usize) {
        let mut inner = self.lock();
        touch_remove(&mut inner.order, index);
        inner.ready.remove(&index);
        inner.weak.remove(&index);
    }

    /// Drop all strong retention (the explicit "memory pressure" trigger).
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ready.clear();
        inner.order.clear();
    }

    fn run_loader(
        &self,
        index: usize,
        flight: &Arc<InFlight>,
    ) -> Result<PlaneBuffer, PlaneLoadError> {
        // Publishes a failure if the loader panics, so waiters on this key
        // are never stranded.
        let mut guard = FlightGuard {
            cache: self,
            index,
            flight,
            published: false,
        };
        let result = (self.loader)(index);
        guard.publish(result.clone());
        result
    }

    fn publish(&self, index: usize, flight: &InFlight, result: Result<PlaneBuffer, PlaneLoadError>) {
        {
            let mut inner = self.lock();
            inner.loading.remove(&index);
            if let Ok(buf) = &result {
                inner.ready.insert(index, buf.clone());
                inner.weak.insert(index, buf.downgrade());
                touch(&mut inner.order, index);
                self.evict_over_capacity(&mut inner);
            }
        }
        let mut outcome = flight
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *outcome = Some(result);
        flight.done.notify_all();
    }

    fn evict_over_capacity(&self, inner: &mut Inner) {
        if let Some(capacity) = self.capacity {
            while inner.ready.len() > capacity && !inner.order.is_empty() {
                let oldest = inner.order.remove(0);
                inner.ready.remove(&oldest);
            }
            // Drop weak entries whose buffers are gone, so the side table
            // stays proportional to live planes, not all planes ever seen.
            inner.weak.retain(|_, weak| weak.upgrade().is_some());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for PlaneCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.lock();
        f.debug_struct("PlaneCache")
            .field("retained", &inner.ready.len())
            .field("loading", &inner.loading.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Move `index` to the most-recently-used end.
fn touch(order: &mut Vec<usize>, index: usize) {
    touch_remove(order, index);
    order.push(index);
}

fn touch_remove(order: &mut Vec<usize>, index: usize) {
    if let Some(pos) = order.iter().position(|&i| i == index) {
        order.remove(pos);
    }
}

struct FlightGuard<'a> {
    cache: &'a PlaneCache,
    index: usize,
    flight: &'a Arc<InFlight>,
    published: bool,
}

impl FlightGuard<'_> {
    fn publish(&mut self, result: Result<PlaneBuffer, PlaneLoadError>) {
        self.published = true;
        self.cache.publish(self.index, self.flight, result);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            let error = PlaneLoadError::new(self.index, "loader panicked".to_string());
            self.cache.publish(self.index, self.flight, Err(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::SharedPlane;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn byte_plane(fill: u8) -> PlaneBuffer {
        PlaneBuffer::U8(SharedPlane::from_vec(vec![fill; 4], 2, 2))
    }

    fn counting_cache() -> (Arc<AtomicUsize>, PlaneCache) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = PlaneCache::new(move |index| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(byte_plane(index as u8))
        });
        (calls, cache)
    }

    #[test]
    fn repeated_get_loads_once() {
        let (calls, cache) = counting_cache();
        let first = cache.get(3).unwrap();
        let second = cache.get(3).unwrap();
        assert!(first.same_buffer(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_get_same_key_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = Arc::new(PlaneCache::new(move |index| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Give other threads time to pile onto the same key.
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(byte_plane(index as u8))
        }));
        let start = Arc::new(Barrier::new(8));
        let buffers: Vec<PlaneBuffer> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    cache.get(5).unwrap()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for buf in &buffers[1..] {
            assert!(buffers[0].same_buffer(buf));
        }
    }

    #[test]
    fn different_keys_load_in_parallel() {
        // Both loaders meet at a barrier; if loads were serialized across
        // keys this would deadlock instead of completing.
        let rendezvous = Arc::new(Barrier::new(2));
        let sync = Arc::clone(&rendezvous);
        let cache = Arc::new(PlaneCache::new(move |index| {
            sync.wait();
            Ok(byte_plane(index as u8))
        }));
        let other = Arc::clone(&cache);
        let handle = thread::spawn(move || other.get(1).unwrap());
        let a = cache.get(0).unwrap();
        let b = handle.join().unwrap();
        assert!(!a.same_buffer(&b));
    }

    #[test]
    fn failure_is_not_retained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = PlaneCache::new(move |index| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PlaneLoadError::new(index, "backend offline".to_string()))
            } else {
                Ok(byte_plane(7))
            }
        });
        let err = cache.get(2).unwrap_err();
        assert_eq!(err.index(), 2);
        assert!(format!("{err}").contains("backend offline"));
        // The key is not poisoned; the next get retries the loader.
        assert!(cache.get(2).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_reaches_blocked_waiters() {
        let cache = Arc::new(PlaneCache::new(move |index| {
            thread::sleep(std::time::Duration::from_millis(20));
            Err(PlaneLoadError::new(index, "flaky".to_string()))
        }));
        let start = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    cache.get(9)
                })
            })
            .collect();
        for handle in handles {
            let err = handle.join().unwrap().unwrap_err();
            assert_eq!(err.index(), 9);
        }
    }

    #[test]
    fn lru_bound_evicts_least_recent() {
        let (calls, cache) = counting_cache();
        let cache = cache.with_capacity(2);
        let _zero = cache.get(0).unwrap();
        drop(_zero);
        let _one = cache.get(1).unwrap();
        drop(_one);
        assert_eq!(cache.len(), 2);
        let _two = cache.get(2).unwrap();
        drop(_two);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(0));
        // Plane 0 was dropped everywhere, so this is a fresh load.
        cache.get(0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn dead_weak_entries_are_pruned_on_eviction() {
        let (_calls, cache) = counting_cache();
        let cache = cache.with_capacity(1);
        cache.get(0).unwrap();
        cache.get(1).unwrap();
        cache.get(2).unwrap();
        let inner = cache.lock();
        // Planes 0 and 1 were evicted with no handle alive; their weak
        // entries are gone too. Plane 2 is still strongly retained.
        assert!(!inner.weak.contains_key(&0));
        assert!(!inner.weak.contains_key(&1));
        assert!(inner.weak.contains_key(&2));
    }

    #[test]
    fn evicted_but_alive_plane_is_resurrected() {
        let (calls, cache) = counting_cache();
        let held = cache.get(0).unwrap();
        assert!(cache.evict(0));
        assert!(!cache.contains(0));
        // Still alive through `held`; no reload happens.
        let again = cache.get(0).unwrap();
        assert!(held.same_buffer(&again));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_forces_reload_despite_live_handles() {
        let (calls, cache) = counting_cache();
        let held = cache.get(0).unwrap();
        cache.invalidate(0);
        let fresh = cache.get(0).unwrap();
        assert!(!held.same_buffer(&fresh));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_drops_strong_retention() {
        let (calls, cache) = counting_cache();
        cache.get(0).unwrap();
        cache.get(1).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.get(0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("tile {0} missing from backing store")]
    struct MissingTile(usize);

    #[test]
    fn loader_errors_keep_their_source() {
        let cache = PlaneCache::new(|index| Err(PlaneLoadError::new(index, MissingTile(index))));
        let err = cache.get(4).unwrap_err();
        let source = core::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "tile 4 missing from backing store");
    }

    #[test]
    fn loader_panic_frees_the_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = Arc::new(PlaneCache::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("boom");
            }
            Ok(byte_plane(1))
        }));
        let panicking = Arc::clone(&cache);
        let result = thread::spawn(move || panicking.get(0)).join();
        assert!(result.is_err());
        // Waiting and later callers are not stranded.
        assert!(cache.get(0).is_ok());
    }
}
