//! Statistic entry state: the cached value/format pair and the external
//! memory-refcount hooks.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::traits::StatSource;

/// A single statistic datum produced by a [`StatSource`].
///
/// `format` is a template in which the first `{}` is replaced by `value`
/// when the datum is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatValue {
    pub value: i64,
    pub format: String,
}

impl StatValue {
    pub fn new(value: i64, format: impl Into<String>) -> Self {
        StatValue {
            value,
            format: format.into(),
        }
    }

    /// Renders the value through the format template.
    pub(crate) fn render(&self) -> String {
        self.format.replacen("{}", &self.value.to_string(), 1)
    }
}

/// Hooks notifying the owner of a statistic's backing memory that the
/// memory is in use while the entry exists.
///
/// `retain` is invoked exactly once when the statistic entry is created and
/// `release` exactly once when it is finally destroyed, regardless of how
/// many transient references the entry gains and loses in between.
pub struct StatMemoryHooks {
    retain: Box<dyn Fn() + Send + Sync>,
    release: Box<dyn Fn() + Send + Sync>,
}

impl StatMemoryHooks {
    pub fn new(
        retain: impl Fn() + Send + Sync + 'static,
        release: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        StatMemoryHooks {
            retain: Box::new(retain),
            release: Box::new(release),
        }
    }

    pub(crate) fn retain(&self) {
        (self.retain)();
    }

    pub(crate) fn release(&self) {
        (self.release)();
    }
}

impl fmt::Debug for StatMemoryHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatMemoryHooks").finish_non_exhaustive()
    }
}

/// Shared state of one statistic entry.
///
/// The cached value/format pair is only meaningful between a successful
/// `start`/`next` and the following `show` of an active read iteration.
pub struct StatState {
    pub(crate) source: Arc<dyn StatSource>,
    pub(crate) cache: Mutex<Option<StatValue>>,
}

impl StatState {
    pub(crate) fn new(source: Arc<dyn StatSource>) -> Self {
        StatState {
            source,
            cache: Mutex::new(None),
        }
    }

    /// Asks the source for the datum at `position` and caches it.
    /// Returns true if a value was produced, false at end of sequence.
    pub(crate) fn fetch(&self, position: u64) -> bool {
        match self.source.next_stat(position) {
            Some(value) => {
                *self.cache.lock().unwrap() = Some(value);
                true
            }
            None => false,
        }
    }

    /// Renders the cached value, or None if no value is cached.
    pub(crate) fn render_cached(&self) -> Option<String> {
        self.cache.lock().unwrap().as_ref().map(StatValue::render)
    }
}

impl fmt::Debug for StatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatState")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedStats(Vec<i64>);

    impl StatSource for FixedStats {
        fn next_stat(&self, position: u64) -> Option<StatValue> {
            self.0
                .get(position as usize)
                .map(|v| StatValue::new(*v, "{}\n"))
        }
    }

    #[test]
    fn test_render_substitutes_value() {
        assert_eq!(StatValue::new(7, "count: {}\n").render(), "count: 7\n");
        assert_eq!(StatValue::new(-3, "{}").render(), "-3");
    }

    #[test]
    fn test_fetch_caches_until_end() {
        let state = StatState::new(Arc::new(FixedStats(vec![1, 2])));
        assert!(state.render_cached().is_none());

        assert!(state.fetch(0));
        assert_eq!(state.render_cached().unwrap(), "1\n");

        assert!(state.fetch(1));
        assert_eq!(state.render_cached().unwrap(), "2\n");

        // End of sequence: fetch reports it without producing a new value.
        assert!(!state.fetch(2));
        assert_eq!(state.render_cached().unwrap(), "2\n");
    }

    #[test]
    fn test_hooks_invoke_callbacks() {
        let retained = Arc::new(AtomicU32::new(0));
        let released = Arc::new(AtomicU32::new(0));
        let (r1, r2) = (retained.clone(), released.clone());
        let hooks = StatMemoryHooks::new(
            move || {
                r1.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                r2.fetch_add(1, Ordering::SeqCst);
            },
        );

        hooks.retain();
        assert_eq!(retained.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        hooks.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
