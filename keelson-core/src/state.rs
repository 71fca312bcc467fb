use serde::{de::DeserializeOwned, Serialize};

/// State that can be snapshotted by a [`crate::Checkpointer`].
pub trait StateSchema:
    Serialize + DeserializeOwned + Clone + Default + Send + Sync + std::fmt::Debug + 'static
{
    /// User that owns the thread this state belongs to. Checkpointers index
    /// threads by it for [`crate::Checkpointer::list_threads`].
    fn owner(&self) -> Option<&str> {
        None
    }
}
