//! The shared list of application names to monitor
//!
//! The list is an immutable `Arc<[String]>` swapped wholesale on every
//! replace, so a reader holds the lock only long enough to clone a pointer
//! and always sees either the whole old list or the whole new one.

use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct WatchList {
    names: Arc<RwLock<Arc<[String]>>>,
}

impl Default for WatchList {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchList {
    /// Create an empty watch list
    pub fn new() -> Self {
        Self::from_names(Vec::new())
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self {
            names: Arc::new(RwLock::new(Arc::from(names))),
        }
    }

    /// Replace the whole list. Returns `true` if the contents changed.
    pub async fn replace(&self, names: Vec<String>) -> bool {
        let next: Arc<[String]> = Arc::from(names);
        let mut guard = self.names.write().await;
        let changed = **guard != *next;
        *guard = next;
        changed
    }

    /// The current list. Later replaces do not affect a snapshot already taken.
    pub async fn snapshot(&self) -> Arc<[String]> {
        self.names.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let list = WatchList::new();
        assert!(list.is_empty().await);
        assert!(list.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_and_snapshot() {
        let list = WatchList::new();
        assert!(list.replace(names(&["bash", "nautilus"])).await);
        assert_eq!(&*list.snapshot().await, names(&["bash", "nautilus"]).as_slice());
        assert_eq!(list.len().await, 2);

        assert!(!list.replace(names(&["bash", "nautilus"])).await);
        assert!(list.replace(names(&[])).await);
        assert!(list.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_later_replaces() {
        let list = WatchList::from_names(names(&["bash"]));
        let before = list.snapshot().await;
        list.replace(names(&["firefox", "Xorg"])).await;

        assert_eq!(&*before, names(&["bash"]).as_slice());
        assert_eq!(&*list.snapshot().await, names(&["firefox", "Xorg"]).as_slice());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_snapshots_never_see_partial_lists() {
        let old = names(&["a1", "a2", "a3"]);
        let new = names(&["b1", "b2", "b3", "b4", "b5"]);
        let list = WatchList::from_names(old.clone());

        let writer = {
            let list = list.clone();
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for i in 0..2_000 {
                    let next = if i % 2 == 0 { new.clone() } else { old.clone() };
                    list.replace(next).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let list = list.clone();
                let (old, new) = (old.clone(), new.clone());
                tokio::spawn(async move {
                    for _ in 0..2_000 {
                        let seen = list.snapshot().await;
                        assert!(
                            *seen == *old || *seen == *new,
                            "observed a mixed list: {:?}",
                            seen
                        );
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
