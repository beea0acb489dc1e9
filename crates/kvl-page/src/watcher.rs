use std::sync::{Arc, Mutex};

use kvl_types::ChangeSource;

use crate::commit::Commit;

/// Observer of committed changes on one page.
///
/// Watchers are invoked synchronously on the context that inserted the
/// commit, in registration order, exactly once per commit. A watcher must
/// not call back into mutating page operations from the callback; defer
/// such work to a later tick.
pub trait CommitWatcher: Send + Sync {
    /// A commit became visible, with its provenance.
    fn on_new_commit(&self, commit: &Commit, source: ChangeSource);
}

/// Handle identifying one watcher registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

struct WatcherSetInner {
    next_id: u64,
    watchers: Vec<(WatcherId, Arc<dyn CommitWatcher>)>,
}

/// Registration-ordered fan-out list.
///
/// Removal is effective immediately: membership is re-checked right before
/// each delivery, so a watcher removed during a fan-out completes the
/// delivery already in progress but receives nothing afterwards.
pub(crate) struct WatcherSet {
    inner: Mutex<WatcherSetInner>,
}

impl WatcherSet {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(WatcherSetInner {
                next_id: 0,
                watchers: Vec::new(),
            }),
        }
    }

    pub(crate) fn add(&self, watcher: Arc<dyn CommitWatcher>) -> WatcherId {
        let mut inner = self.inner.lock().expect("watcher lock poisoned");
        let id = WatcherId(inner.next_id);
        inner.next_id += 1;
        inner.watchers.push((id, watcher));
        id
    }

    pub(crate) fn remove(&self, id: WatcherId) -> bool {
        let mut inner = self.inner.lock().expect("watcher lock poisoned");
        let before = inner.watchers.len();
        inner.watchers.retain(|(wid, _)| *wid != id);
        inner.watchers.len() != before
    }

    pub(crate) fn notify(&self, commit: &Commit, source: ChangeSource) {
        let ids: Vec<WatcherId> = {
            let inner = self.inner.lock().expect("watcher lock poisoned");
            inner.watchers.iter().map(|(id, _)| *id).collect()
        };

        for id in ids {
            // Re-check membership so removal during fan-out is honored,
            // and drop the lock before delivering.
            let watcher = {
                let inner = self.inner.lock().expect("watcher lock poisoned");
                inner
                    .watchers
                    .iter()
                    .find(|(wid, _)| *wid == id)
                    .map(|(_, w)| Arc::clone(w))
            };
            if let Some(watcher) = watcher {
                watcher.on_new_commit(commit, source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kvl_types::ObjectId;

    #[derive(Default)]
    struct CountingWatcher {
        count: AtomicUsize,
    }

    impl CommitWatcher for CountingWatcher {
        fn on_new_commit(&self, _commit: &Commit, _source: ChangeSource) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn some_commit() -> Commit {
        Commit::root(ObjectId::from_data(b"empty"))
    }

    #[test]
    fn registered_watchers_are_notified() {
        let set = WatcherSet::new();
        let w1 = Arc::new(CountingWatcher::default());
        let w2 = Arc::new(CountingWatcher::default());
        set.add(Arc::clone(&w1) as Arc<dyn CommitWatcher>);
        set.add(Arc::clone(&w2) as Arc<dyn CommitWatcher>);

        set.notify(&some_commit(), ChangeSource::Local);
        assert_eq!(w1.count.load(Ordering::SeqCst), 1);
        assert_eq!(w2.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_watcher_is_not_notified() {
        let set = WatcherSet::new();
        let w = Arc::new(CountingWatcher::default());
        let id = set.add(Arc::clone(&w) as Arc<dyn CommitWatcher>);

        set.notify(&some_commit(), ChangeSource::Local);
        assert!(set.remove(id));
        set.notify(&some_commit(), ChangeSource::Sync);

        assert_eq!(w.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_unknown_id_returns_false() {
        let set = WatcherSet::new();
        let w = Arc::new(CountingWatcher::default());
        let id = set.add(w as Arc<dyn CommitWatcher>);
        assert!(set.remove(id));
        assert!(!set.remove(id));
    }

    #[test]
    fn watcher_added_after_a_commit_does_not_see_it() {
        let set = WatcherSet::new();
        set.notify(&some_commit(), ChangeSource::Local);

        let w = Arc::new(CountingWatcher::default());
        set.add(Arc::clone(&w) as Arc<dyn CommitWatcher>);
        assert_eq!(w.count.load(Ordering::SeqCst), 0);
    }
}
