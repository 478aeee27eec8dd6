use crate::error::ComputeError;
use std::fmt::Debug;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::trace;

/// Single-slot memo for an expensive value owned by one entity, like generated DDL text.
///
/// The value is computed on first request and kept until the owner asks for a refresh. Concurrent requests to the
/// same instance are serialized, so the computation never runs twice for the same request cycle.
pub struct DerivedValue<V> {
    value: Mutex<Option<V>>,
}

impl<V> DerivedValue<V>
where
    V: Clone + Send,
{
    pub fn new() -> Self {
        Self { value: Mutex::new(None) }
    }

    /// Return the memoized value, computing it if it is absent. With `force_refresh` set the stored value is
    /// dropped first.
    ///
    /// A failed computation leaves the slot empty and is reported to the caller as is.
    pub async fn get_or_compute<F, Fut, E>(&self, force_refresh: bool, compute: F) -> Result<V, ComputeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut guard = self.value.lock().await;

        if force_refresh && guard.take().is_some() {
            trace!("derived value dropped for refresh");
        }

        if let Some(value) = guard.as_ref() {
            return Ok(value.clone());
        }

        let value = compute().await.map_err(ComputeError::Failed)?;
        *guard = Some(value.clone());
        Ok(value)
    }

    /// Drop the stored value. The next request recomputes it.
    pub async fn invalidate(&self) -> Option<V> {
        self.value.lock().await.take()
    }

    /// The stored value, without computing anything.
    pub async fn peek(&self) -> Option<V> {
        self.value.lock().await.clone()
    }

    pub async fn is_present(&self) -> bool {
        self.value.lock().await.is_some()
    }
}

impl<V> Default for DerivedValue<V>
where
    V: Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Debug for DerivedValue<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = self.value.try_lock().map(|v| v.is_some()).ok();
        f.debug_struct("DerivedValue").field("present", &present).finish()
    }
}
