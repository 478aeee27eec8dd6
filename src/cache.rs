use crate::context::LoadContext;
use crate::entry::EntrySlot;
use crate::entry::PendingLoad;
use crate::prelude::*;
use fieldx::fxstruct;
use moka::future::Cache;
use std::sync::Arc;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

type Slot<L> = EntrySlot<<L as ChildLoader>::Child, <L as ChildLoader>::Error>;
type SlotMap<L> = Cache<<L as ChildLoader>::Parent, Arc<Slot<L>>>;

/// Parent-scoped cache of child collections.
///
/// ```ignore
/// let columns = ChildCache::builder()
///     .loader(ColumnLoader::new(source))
///     .name("columns")
///     .build()?;
///
/// // The first call runs the loader, the following ones are served from the cache until the parent is cleared.
/// let children = columns.get_children(&table_ref).await?;
/// let by_name = columns.get_child(&table_ref, "id").await?;
///
/// columns.clear(&table_ref).await;
/// ```
///
/// Every parent gets its own slot in a [moka](https://crates.io/crates/moka) map. Loads of different parents never
/// wait for each other; for the same parent only one load runs at a time and every concurrent caller receives its
/// outcome. A loaded collection, or a failure, stays in place until the parent is cleared or evicted. There is no
/// capacity-driven eviction.
///
/// The load itself runs in its own tokio task. A caller that gives up waiting doesn't cancel it; the outcome is
/// still stored for later readers unless the entry was cleared after the load started. In the latter case the
/// outcome is handed to the caller which initiated the load and then discarded.
#[fxstruct(
    sync,
    rc,
    no_new,
    default(off),
    builder(
        doc("Builder object of [`ChildCache`].", "", "See [`ChildCache::builder()`] method."),
        method_doc("Implement builder pattern for [`ChildCache`]."),
    )
)]
pub struct ChildCache<L>
where
    L: ChildLoader,
{
    #[fieldx(get(clone), builder(required, into))]
    loader: Arc<L>,

    /// Cache name. Most useful for debugging and logging.
    #[fieldx(get, builder(into), default(String::from("anon")))]
    name: String,

    /// Number of parents to preallocate room for. The map itself is never bounded: an entry only goes away when it
    /// is evicted explicitly.
    #[fieldx(get(copy), default(0))]
    initial_capacity: usize,

    #[fieldx(private, lazy, get(clone), builder(off))]
    slots: Arc<SlotMap<L>>,
}

impl<L> ChildCache<L>
where
    L: ChildLoader,
{
    fn build_slots(&self) -> Arc<SlotMap<L>> {
        Arc::new(
            Cache::builder()
                .name(self.name())
                .initial_capacity(self.initial_capacity())
                .build(),
        )
    }

    async fn slot(&self, parent: &L::Parent) -> Arc<Slot<L>> {
        self.slots()
            .get_with(parent.clone(), async { Arc::new(EntrySlot::new()) })
            .await
    }

    /// Children of `parent`, loading them if necessary.
    #[instrument(level = "trace", skip(self), fields(cache = %self.name()))]
    pub async fn get_children(&self, parent: &L::Parent) -> Result<Arc<Vec<L::Child>>, LoadError<L::Error>> {
        let slot = self.slot(parent).await;

        if let Some(outcome) = slot.outcome() {
            trace!("cache hit");
            return outcome;
        }

        let guard = slot.acquire_load().await;

        // Someone else may have completed a load while we were waiting for the lock.
        if let Some(outcome) = slot.outcome() {
            trace!("served by a concurrent load");
            return outcome;
        }

        let pending = PendingLoad::new(Arc::clone(&slot), parent.to_string(), guard);
        let generation = pending.generation();
        let ctx = LoadContext::new(self.name(), parent, generation, slot.generation_handle());
        let loader = self.loader();
        let task_parent = parent.clone();
        let cache_name = self.name().clone();

        debug!(cache = %cache_name, %parent, generation, "loading children");

        let load = tokio::spawn(async move {
            let outcome = loader
                .load_children(&task_parent, &ctx)
                .await
                .map(Arc::new)
                .map_err(|err| LoadError::failed(&task_parent, err));

            let (outcome, stored) = pending.finish(outcome);
            if !stored {
                debug!(
                    cache = %cache_name,
                    parent = %task_parent,
                    generation,
                    "entry invalidated while loading; result discarded"
                );
            }
            else if let Err(ref err) = outcome {
                debug!(cache = %cache_name, parent = %task_parent, "load failed: {err}");
            }
            outcome
        });

        match load.await {
            Ok(outcome) => outcome,
            // The entry has been marked as failed by the time the task is reported as gone, unless it was
            // invalidated in the meantime.
            Err(err) => match slot.outcome() {
                Some(outcome) if slot.generation() == generation => outcome,
                _ => Err(LoadError::aborted(parent, err)),
            },
        }
    }

    /// Find a child of `parent` by its name or object ID. A miss is not an error.
    pub async fn get_child(
        &self,
        parent: &L::Parent,
        id: impl Into<ChildId>,
    ) -> Result<Option<L::Child>, LoadError<L::Error>>
    where
        L::Child: MetaObject,
    {
        let id = id.into();
        let children = self.get_children(parent).await?;
        let found = children.iter().find(|child| id.matches(*child)).cloned();
        if found.is_none() {
            debug!(cache = %self.name(), %parent, child = %id, "child not found");
        }
        Ok(found)
    }

    /// Children of `parent` if they're already loaded. Never triggers a load.
    pub async fn cached_children(&self, parent: &L::Parent) -> Option<Arc<Vec<L::Child>>> {
        self.slots().get(parent).await.and_then(|slot| slot.cached())
    }

    /// Put a complete collection in place of whatever the entry holds. A load that is in flight at the moment
    /// will not overwrite it.
    pub async fn cache_children(&self, parent: &L::Parent, children: Vec<L::Child>) -> Arc<Vec<L::Child>> {
        trace!(cache = %self.name(), %parent, count = children.len(), "caching children");
        self.slot(parent).await.replace(children)
    }

    /// Append a single child to the parent's collection. If the collection isn't loaded the child becomes its only
    /// member.
    pub async fn cache_object(&self, parent: &L::Parent, child: L::Child) {
        self.slot(parent).await.push(child);
    }

    /// Return the parent's entry to the unloaded state. Does nothing if it was never loaded.
    pub async fn clear(&self, parent: &L::Parent) {
        if let Some(slot) = self.slots().get(parent).await {
            trace!(cache = %self.name(), %parent, "clearing entry");
            slot.invalidate();
        }
    }

    pub fn clear_all(&self) {
        debug!(cache = %self.name(), "clearing all entries");
        let slots = self.slots();
        for (_parent, slot) in slots.iter() {
            slot.invalidate();
        }
    }

    /// Forget the parent altogether.
    pub async fn evict(&self, parent: &L::Parent) {
        if let Some(slot) = self.slots().remove(parent).await {
            trace!(cache = %self.name(), %parent, "evicting entry");
            slot.invalidate();
        }
    }

    pub async fn status(&self, parent: &L::Parent) -> EntryStatus {
        self.slots()
            .get(parent)
            .await
            .map_or(EntryStatus::Unloaded, |slot| slot.status())
    }

    /// Current generation of the parent's entry. Zero for parents never seen.
    pub async fn generation(&self, parent: &L::Parent) -> u64 {
        self.slots().get(parent).await.map_or(0, |slot| slot.generation())
    }
}
