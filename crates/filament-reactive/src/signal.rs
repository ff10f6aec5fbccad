#![forbid(unsafe_code)]

//! Cross-thread invalidation signals.
//!
//! The graph itself is single-threaded (`Rc`-based, owned by one thread).
//! The one operation other threads may perform is delivering a raw
//! invalidation: [`InvalidationSignal::signal`] sets a shared stale latch
//! and fires a wake callback at most once per staleness episode. The owning
//! thread folds the latch into the node's stale flag the next time the node
//! is read or explicitly absorbed.
//!
//! The wake callback runs on the **signalling** thread. It must not touch
//! graph state; its job is to nudge the owning thread's dispatcher (post a
//! wake token, write to a pipe, and so on).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// `Send + Sync` invalidation handle for one [`DependencyNode`].
///
/// Obtained from [`DependencyNode::remote_signal`]. Cloning shares the same
/// latch, so clones collapse into the same staleness episode.
///
/// [`DependencyNode`]: crate::DependencyNode
/// [`DependencyNode::remote_signal`]: crate::DependencyNode::remote_signal
#[derive(Clone)]
pub struct InvalidationSignal {
    stale: Arc<AtomicBool>,
    wake: Arc<dyn Fn() + Send + Sync>,
}

impl InvalidationSignal {
    pub(crate) fn new(stale: Arc<AtomicBool>, wake: Arc<dyn Fn() + Send + Sync>) -> Self {
        InvalidationSignal { stale, wake }
    }

    /// Latch the node stale and fire the wake callback if this is the first
    /// signal of the episode. Safe from any thread; never blocks.
    pub fn signal(&self) {
        if !self.stale.swap(true, Ordering::AcqRel) {
            (self.wake)();
        }
    }

    /// Whether a signal is latched and not yet absorbed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for InvalidationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationSignal")
            .field("pending", &self.is_pending())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::node::DependencyNode;
    use crate::source::Tracked;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn wake_fires_once_per_episode() {
        let node = DependencyNode::new(|| {});
        let wakes = Arc::new(AtomicU32::new(0));
        let wakes_clone = Arc::clone(&wakes);
        let signal = node.remote_signal(move || {
            wakes_clone.fetch_add(1, Ordering::SeqCst);
        });

        node.record_read();
        signal.signal();
        signal.signal();
        signal.signal();
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert!(signal.is_pending());

        // Absorbing starts a fresh episode.
        node.absorb_remote_stale();
        assert!(node.is_stale());
        assert!(!signal.is_pending());
        node.record_read();

        signal.signal();
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_from_background_thread() {
        let value = Tracked::new(5);
        let value_clone = value.clone();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let node = DependencyNode::new(move || seen_clone.set(value_clone.get()));
        node.record_read();
        assert_eq!(seen.get(), 5);

        let wakes = Arc::new(AtomicU32::new(0));
        let wakes_clone = Arc::clone(&wakes);
        let signal = node.remote_signal(move || {
            wakes_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handle = std::thread::spawn(move || {
            signal.signal();
        });
        handle.join().expect("signalling thread panicked");

        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        // The owning thread folds the latch in on the next read.
        value.set(9);
        node.record_read();
        assert_eq!(seen.get(), 9);
        assert!(!node.is_stale());
    }

    #[test]
    fn clones_share_the_latch() {
        let node = DependencyNode::new(|| {});
        let wakes = Arc::new(AtomicU32::new(0));
        let wakes_clone = Arc::clone(&wakes);
        let s1 = node.remote_signal(move || {
            wakes_clone.fetch_add(1, Ordering::SeqCst);
        });
        let s2 = s1.clone();

        node.record_read();
        s1.signal();
        s2.signal();
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_after_dispose_is_inert() {
        let runs = Rc::new(Cell::new(0u32));
        let runs_clone = Rc::clone(&runs);
        let node = DependencyNode::new(move || runs_clone.set(runs_clone.get() + 1));
        let signal = node.remote_signal(|| {});

        node.record_read();
        node.dispose();

        signal.signal();
        node.record_read();
        assert_eq!(runs.get(), 1);
    }
}
