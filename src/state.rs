use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token naming one pool binding inside an [`AppState`].
///
/// Minted once per [`Database`](crate::Database); two binders never share a
/// slot, so several pools can live side by side in one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(Uuid);

impl SlotId {
    /// Mint a new process-unique slot identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0.simple())
    }
}

type StoredPool = Arc<dyn Any + Send + Sync>;

/// Application state shared by the lifecycle hooks and every request scope
///
/// Holds the live pool handle of each configured binder, keyed by its
/// [`SlotId`]. Values are type-erased so binders over different drivers can
/// share one state; readers ask for the concrete handle type they stored.
/// Cloning is cheap and every clone sees the same slots.
#[derive(Clone, Default)]
pub struct AppState {
    pools: Arc<scc::HashMap<SlotId, StoredPool>>,
}

impl AppState {
    /// Create an empty application state
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `pool` at `slot`.
    ///
    /// Returns `false` and leaves the existing entry untouched when the slot
    /// is already occupied.
    pub async fn insert<P>(&self, slot: SlotId, pool: P) -> bool
    where
        P: Any + Send + Sync,
    {
        self.pools.insert_async(slot, Arc::new(pool)).await.is_ok()
    }

    /// Clone the handle stored at `slot`, if it holds a `P`.
    pub async fn get<P>(&self, slot: SlotId) -> Option<P>
    where
        P: Any + Send + Sync + Clone,
    {
        self.pools
            .read_async(&slot, |_, stored| stored.downcast_ref::<P>().cloned())
            .await
            .flatten()
    }

    /// Take the handle out of `slot`.
    pub async fn remove<P>(&self, slot: SlotId) -> Option<P>
    where
        P: Any + Send + Sync + Clone,
    {
        let (_, stored) = self.pools.remove_async(&slot).await?;
        stored.downcast::<P>().ok().map(Arc::unwrap_or_clone)
    }

    pub async fn contains(&self, slot: SlotId) -> bool {
        self.pools.read_async(&slot, |_, _| ()).await.is_some()
    }

    /// Number of published pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("pools", &self.pools.len())
            .finish()
    }
}
