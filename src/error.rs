use std::sync::Arc;
use thiserror::Error;

/// Failure of a child collection load.
///
/// The error is stored in the cache entry and handed out to every caller until the entry is cleared, hence it is
/// cheap to clone and keeps the loader's error behind an [`Arc`].
#[derive(Debug, Error)]
pub enum LoadError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("failed to load children of {parent}: {source}")]
    Failed {
        parent: String,
        #[source]
        source: Arc<E>,
    },

    #[error("loading children of {parent} was aborted: {reason}")]
    Aborted { parent: String, reason: String },
}

impl<E> LoadError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn failed(parent: impl ToString, source: E) -> Self {
        Self::Failed {
            parent: parent.to_string(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn aborted(parent: impl ToString, reason: impl ToString) -> Self {
        Self::Aborted {
            parent: parent.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Label of the parent whose children could not be loaded.
    pub fn parent(&self) -> &str {
        match self {
            Self::Failed { parent, .. } | Self::Aborted { parent, .. } => parent,
        }
    }

    /// The loader's own error, if the load got far enough to produce one.
    pub fn cause(&self) -> Option<&E> {
        match self {
            Self::Failed { source, .. } => Some(source),
            Self::Aborted { .. } => None,
        }
    }
}

impl<E> Clone for LoadError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::Failed { parent, source } => Self::Failed {
                parent: parent.clone(),
                source: Arc::clone(source),
            },
            Self::Aborted { parent, reason } => Self::Aborted {
                parent: parent.clone(),
                reason: reason.clone(),
            },
        }
    }
}

/// Failure of a [`DerivedValue`](crate::DerivedValue) computation.
#[derive(Debug, Error)]
pub enum ComputeError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("failed to compute derived value: {0}")]
    Failed(#[source] E),
}

impl<E> ComputeError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn into_inner(self) -> E {
        match self {
            Self::Failed(err) => err,
        }
    }
}
