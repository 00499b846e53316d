use super::DataStore;
use crate::error::Result;
use std::path::Path;

/// Production-grade `DataStore` backed by `sled`'s transactional,
/// fsync-capable B-tree. Each logical namespace (node state, applied
/// storage) is opened as its own tree within one database file, the
/// direct analogue of the source's single-bucket Bolt database per
/// namespace.
pub struct SledDataStore {
    tree: sled::Tree,
}

impl SledDataStore {
    pub fn open(db_path: impl AsRef<Path>, tree_name: &str) -> Result<Self> {
        let db = sled::open(db_path)?;
        let tree = db.open_tree(tree_name)?;
        Ok(Self { tree })
    }
}

impl DataStore for SledDataStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(key, value.as_bytes())?;
        // The engine treats every put as durable upon return.
        self.tree.flush()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.tree.get(key)? {
            Some(bytes) => {
                let value = String::from_utf8_lossy(&bytes).into_owned();
                if value.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
            None => Ok(None),
        }
    }
}
