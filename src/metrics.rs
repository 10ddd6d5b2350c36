use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A supplier polled for the current value of a gauge.
pub type GaugeFn = Box<Fn() -> i64 + Send + Sync>;

/// The sink the producer reports into.
///
/// The producer only creates instruments and marks them; aggregation,
/// rates and export belong to the host.
pub trait MetricsRegistry: Send + Sync {
    /// Returns the meter registered under `name`, creating it on first use.
    fn meter(&self, name: &str) -> Meter;

    /// Registers a gauge whose current value is polled from `supplier`.
    fn gauge(&self, name: &str, supplier: GaugeFn);

    /// Drops the instrument registered under `name`.
    fn unregister(&self, name: &str);
}

/// A monotonically increasing event counter.
#[derive(Clone, Default)]
pub struct Meter {
    count: Arc<AtomicUsize>,
}

impl Meter {
    pub fn mark(&self, n: usize) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

/// The default process-local registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    meters: Mutex<HashMap<String, Meter>>,
    gauges: Mutex<HashMap<String, GaugeFn>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Polls the gauge registered under `name`.
    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        lock(&self.gauges).get(name).map(|supplier| supplier())
    }
}

impl MetricsRegistry for InMemoryRegistry {
    fn meter(&self, name: &str) -> Meter {
        lock(&self.meters)
            .entry(name.to_owned())
            .or_insert_with(Meter::default)
            .clone()
    }

    fn gauge(&self, name: &str, supplier: GaugeFn) {
        lock(&self.gauges).insert(name.to_owned(), supplier);
    }

    fn unregister(&self, name: &str) {
        lock(&self.meters).remove(name);
        lock(&self.gauges).remove(name);
    }
}

lazy_static! {
    static ref DEFAULT_REGISTRY: Arc<InMemoryRegistry> = Arc::new(InMemoryRegistry::new());
}

/// The registry producers report into unless one is passed explicitly.
pub fn default_registry() -> Arc<InMemoryRegistry> {
    DEFAULT_REGISTRY.clone()
}
