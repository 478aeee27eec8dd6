use crate::error::LoadError;
use crate::types::EntryStatus;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

pub(crate) type Outcome<C, E> = Result<Arc<Vec<C>>, LoadError<E>>;

pub(crate) enum EntryState<C, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    Unloaded,
    Loading,
    Loaded(Arc<Vec<C>>),
    Failed(LoadError<E>),
}

impl<C, E> EntryState<C, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn status(&self) -> EntryStatus {
        match self {
            Self::Unloaded => EntryStatus::Unloaded,
            Self::Loading => EntryStatus::Loading,
            Self::Loaded(_) => EntryStatus::Loaded,
            Self::Failed(_) => EntryStatus::Failed,
        }
    }
}

// One slot per parent key. The state lock is only ever held for as long as it takes to read or swap the state, so
// invalidation never waits for a load. Loads are serialized by `load_lock` which is owned by the loading task.
//
// `generation` is only modified under the state lock; it lives in an atomic so that a LoadContext can check for
// staleness without touching the lock.
pub(crate) struct EntrySlot<C, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    state:      Mutex<EntryState<C, E>>,
    generation: Arc<AtomicU64>,
    load_lock:  Arc<AsyncMutex<()>>,
}

impl<C, E> EntrySlot<C, E>
where
    C: Clone,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            state:      Mutex::new(EntryState::Unloaded),
            generation: Arc::new(AtomicU64::new(0)),
            load_lock:  Arc::new(AsyncMutex::new(())),
        }
    }

    pub(crate) fn status(&self) -> EntryStatus {
        self.state.lock().status()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn generation_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    /// Terminal outcome of the last load, if there is one.
    pub(crate) fn outcome(&self) -> Option<Outcome<C, E>> {
        match &*self.state.lock() {
            EntryState::Loaded(children) => Some(Ok(Arc::clone(children))),
            EntryState::Failed(err) => Some(Err(err.clone())),
            EntryState::Unloaded | EntryState::Loading => None,
        }
    }

    pub(crate) fn cached(&self) -> Option<Arc<Vec<C>>> {
        match &*self.state.lock() {
            EntryState::Loaded(children) => Some(Arc::clone(children)),
            _ => None,
        }
    }

    pub(crate) async fn acquire_load(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.load_lock).lock_owned().await
    }

    /// Must be called with the load lock held. Returns the generation the load belongs to.
    pub(crate) fn begin_load(&self) -> u64 {
        let mut state = self.state.lock();
        *state = EntryState::Loading;
        self.generation.load(Ordering::Acquire)
    }

    /// Publish a load outcome. Nothing is stored if the entry has moved on to another generation.
    pub(crate) fn complete(&self, generation: u64, outcome: &Outcome<C, E>) -> bool {
        let mut state = self.state.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        *state = match outcome {
            Ok(children) => EntryState::Loaded(Arc::clone(children)),
            Err(err) => EntryState::Failed(err.clone()),
        };
        true
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = EntryState::Unloaded;
    }

    pub(crate) fn replace(&self, children: Vec<C>) -> Arc<Vec<C>> {
        let children = Arc::new(children);
        let mut state = self.state.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = EntryState::Loaded(Arc::clone(&children));
        children
    }

    pub(crate) fn push(&self, child: C) {
        let mut state = self.state.lock();
        let children = match &*state {
            EntryState::Loaded(children) => {
                let mut children = children.as_ref().clone();
                children.push(child);
                children
            }
            _ => {
                // Whatever is in flight must not overwrite what's being put in here.
                self.generation.fetch_add(1, Ordering::AcqRel);
                vec![child]
            }
        };
        *state = EntryState::Loaded(Arc::new(children));
    }
}

impl<C, E> Debug for EntrySlot<C, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrySlot")
            .field("status", &self.state.lock().status())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

// Ownership of a single in-flight load. Holds the slot's load lock until dropped. If dropped without being
// finished, which happens when the loader panics or its task is cancelled, the entry is marked as failed before the
// lock is released so that waiters don't start another load of their own.
pub(crate) struct PendingLoad<C, E>
where
    C: Clone,
    E: std::error::Error + Send + Sync + 'static,
{
    slot:       Arc<EntrySlot<C, E>>,
    parent:     String,
    generation: u64,
    finished:   bool,
    _guard:     OwnedMutexGuard<()>,
}

impl<C, E> PendingLoad<C, E>
where
    C: Clone,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(slot: Arc<EntrySlot<C, E>>, parent: String, guard: OwnedMutexGuard<()>) -> Self {
        let generation = slot.begin_load();
        Self {
            slot,
            parent,
            generation,
            finished: false,
            _guard: guard,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn finish(mut self, outcome: Outcome<C, E>) -> (Outcome<C, E>, bool) {
        let stored = self.slot.complete(self.generation, &outcome);
        self.finished = true;
        (outcome, stored)
    }
}

impl<C, E> Drop for PendingLoad<C, E>
where
    C: Clone,
    E: std::error::Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            let outcome = Err(LoadError::aborted(&self.parent, "loader panicked or was cancelled"));
            self.slot.complete(self.generation, &outcome);
        }
    }
}
