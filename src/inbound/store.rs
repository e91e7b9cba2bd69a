//! Object store holding raw inbound mail.
//!
//! The pipeline only needs paginated listing, download and delete.
//! Production deployments read a bucket (`S3Store`); this module holds the
//! contract and a drop directory backend for local runs:
//!
//! ```text
//! {root}/
//! ├── 0001-message.eml
//! ├── 0002-message.eml
//! └── .incoming-tmp      (dot files are ignored)
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::{MailError, Result};

/// One page of object keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Keys in listing order.
    pub keys: Vec<String>,
    /// Token for the next page, if the listing was truncated.
    pub next: Option<String>,
}

/// Minimal object store contract.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys, starting after `continuation` when given.
    async fn list(&self, continuation: Option<&str>) -> Result<ObjectPage>;

    /// Download an object.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// List every key, following continuation tokens until exhausted.
pub async fn list_all(store: &dyn ObjectStore) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = store.list(continuation.as_deref()).await?;
        keys.extend(page.keys);

        match page.next {
            Some(next) if continuation.as_deref() != Some(next.as_str()) => {
                continuation = Some(next)
            }
            _ => break,
        }
    }

    Ok(keys)
}

/// Object store backed by a local directory.
///
/// Keys are file names, listed in lexical order. The continuation token is
/// the last key of the previous page.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    page_size: usize,
}

impl DirectoryStore {
    /// Open a drop directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>, page_size: usize) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            page_size: page_size.max(1),
        })
    }

    /// Get the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
        {
            return Err(MailError::ObjectStore(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn list(&self, continuation: Option<&str>) -> Result<ObjectPage> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| MailError::ObjectStore(format!("failed to list {:?}: {e}", self.root)))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if continuation.is_some_and(|after| name.as_str() <= after) {
                continue;
            }
            keys.push(name);
        }
        keys.sort();

        let next = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        Ok(ObjectPage { keys, next })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path)
            .await
            .map_err(|e| MailError::ObjectStore(format!("failed to read {key}: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| MailError::ObjectStore(format!("failed to delete {key}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(page_size: usize) -> (TempDir, DirectoryStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path().join("inbound"), page_size).unwrap();
        (temp_dir, store)
    }

    fn write(store: &DirectoryStore, name: &str, content: &[u8]) {
        std::fs::write(store.root().join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let (_temp, store) = setup(2);
        for name in ["c.eml", "a.eml", "b.eml", "d.eml", "e.eml"] {
            write(&store, name, b"x");
        }

        let first = store.list(None).await.unwrap();
        assert_eq!(first.keys, vec!["a.eml", "b.eml"]);
        assert_eq!(first.next.as_deref(), Some("b.eml"));

        let second = store.list(first.next.as_deref()).await.unwrap();
        assert_eq!(second.keys, vec!["c.eml", "d.eml"]);

        let third = store.list(second.next.as_deref()).await.unwrap();
        assert_eq!(third.keys, vec!["e.eml"]);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn test_list_all() {
        let (_temp, store) = setup(2);
        for i in 0..7 {
            write(&store, &format!("{i:03}.eml"), b"x");
        }

        let keys = list_all(&store).await.unwrap();
        assert_eq!(keys.len(), 7);
        assert_eq!(keys.first().map(String::as_str), Some("000.eml"));
        assert_eq!(keys.last().map(String::as_str), Some("006.eml"));
    }

    #[tokio::test]
    async fn test_list_skips_hidden_and_directories() {
        let (_temp, store) = setup(10);
        write(&store, ".partial", b"x");
        write(&store, "mail.eml", b"x");
        std::fs::create_dir(store.root().join("subdir")).unwrap();

        let page = store.list(None).await.unwrap();
        assert_eq!(page.keys, vec!["mail.eml"]);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let (_temp, store) = setup(10);
        write(&store, "mail.eml", b"raw message");

        assert_eq!(store.get("mail.eml").await.unwrap(), b"raw message");
        store.delete("mail.eml").await.unwrap();
        assert!(store.get("mail.eml").await.is_err());
        assert!(store.list(None).await.unwrap().keys.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let (_temp, store) = setup(10);
        assert!(matches!(
            store.get("../secret").await,
            Err(MailError::ObjectStore(_))
        ));
        assert!(store.delete(".hidden").await.is_err());
        assert!(store.get("").await.is_err());
    }
}
