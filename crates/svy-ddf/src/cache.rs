//! Per-pair caches.
//!
//! Enumerated instances, the table layout and resolved join paths are
//! derived from one bound schema/store pair. They live in a [`SessionCache`]
//! owned by that pair and are dropped together whenever the bound files
//! change identity.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use svy_model::{Schema, VariableInstances, enumerate};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::join::JoinPath;
use crate::layout::StoreLayout;

/// SHA-256 of a file's content, hex encoded.
pub fn file_digest(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| StoreError::io("read", path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| StoreError::io("read", path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// What a cache is valid for: the bound paths and the schema content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub schema_path: PathBuf,
    pub store_path: PathBuf,
    pub schema_digest: String,
}

impl FileIdentity {
    pub fn of(schema_path: &Path, store_path: &Path) -> Result<Self> {
        Ok(Self {
            schema_path: schema_path.to_path_buf(),
            store_path: store_path.to_path_buf(),
            schema_digest: file_digest(schema_path)?,
        })
    }
}

#[derive(Debug, Default)]
pub struct SessionCache {
    identity: Option<FileIdentity>,
    instances: OnceCell<VariableInstances>,
    layout: OnceCell<StoreLayout>,
    join_paths: RefCell<HashMap<String, JoinPath>>,
}

impl SessionCache {
    /// Bind to `identity`, dropping every slot if it differs from the current one.
    ///
    /// Returns whether the cache was invalidated.
    pub fn bind(&mut self, identity: FileIdentity) -> bool {
        if self.identity.as_ref() == Some(&identity) {
            return false;
        }
        debug!(
            schema = %identity.schema_path.display(),
            store = %identity.store_path.display(),
            "binding session cache"
        );
        self.invalidate();
        self.identity = Some(identity);
        true
    }

    pub fn identity(&self) -> Option<&FileIdentity> {
        self.identity.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.instances = OnceCell::new();
        self.layout = OnceCell::new();
        self.join_paths.get_mut().clear();
    }

    pub fn instances(&self, schema: &Schema) -> &VariableInstances {
        self.instances.get_or_init(|| enumerate(schema))
    }

    pub fn layout(&self, schema: &Schema) -> &StoreLayout {
        self.layout.get_or_init(|| StoreLayout::from_schema(schema))
    }

    /// Cached join path for `name`, computed by `resolve` on a miss.
    pub fn join_path(
        &self,
        name: &str,
        resolve: impl FnOnce() -> Result<JoinPath>,
    ) -> Result<JoinPath> {
        let key = name.to_lowercase();
        if let Some(path) = self.join_paths.borrow().get(&key) {
            return Ok(path.clone());
        }
        let path = resolve()?;
        self.join_paths.borrow_mut().insert(key, path.clone());
        Ok(path)
    }

    pub fn cached_join_paths(&self) -> usize {
        self.join_paths.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use svy_model::{DataType, FieldNode, Variable};
    use tempfile::NamedTempFile;

    #[test]
    fn digest_matches_known_value() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();
        file.flush().unwrap();
        assert_eq!(
            file_digest(file.path()).unwrap(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn rebinding_drops_every_slot() {
        let mut schema = Schema::default();
        schema
            .fields
            .push(FieldNode::Variable(Variable::new("v1", "Age", DataType::Long)));

        let identity = |digest: &str| FileIdentity {
            schema_path: PathBuf::from("a.mdd"),
            store_path: PathBuf::from("a.ddf"),
            schema_digest: digest.to_string(),
        };

        let mut cache = SessionCache::default();
        assert!(cache.bind(identity("1")));
        assert_eq!(cache.instances(&schema).len(), 1);
        let layout = StoreLayout::from_schema(&schema);
        let path = cache
            .join_path("Age", || {
                crate::join::resolve(&schema, cache.instances(&schema), &layout, "Age")
            })
            .unwrap();
        assert_eq!(path.leaf.column, "Age:L");
        assert_eq!(cache.cached_join_paths(), 1);

        assert!(!cache.bind(identity("1")));
        assert_eq!(cache.cached_join_paths(), 1);

        schema
            .fields
            .push(FieldNode::Variable(Variable::new("v2", "Name", DataType::Text)));
        assert!(cache.bind(identity("2")));
        assert_eq!(cache.cached_join_paths(), 0);
        assert_eq!(cache.instances(&schema).len(), 2);
    }
}
