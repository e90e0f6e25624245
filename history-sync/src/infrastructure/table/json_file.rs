//! File-backed table store
//! Loads a table from a JSON document (`{name, fields, rows}`) and writes the
//! whole document back after every mutation.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use log::debug;
use tokio::fs;

use crate::{
    common::errors::StoreError,
    domain::synchronization::{
        table_store::{Field, FieldId, FieldKind, RowId, TableStore},
        value_objects::cell_value::CellValue,
    },
};

use super::memory::{MemoryTableStore, TableData};

#[derive(Debug)]
pub struct JsonTableStore {
    path: PathBuf,
    inner: MemoryTableStore,
}

impl JsonTableStore {
    /// Opens `path`, or starts an empty table named after the file when it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<TableData>(&raw)
                .map_err(|e| StoreError::new("open", format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TableData {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                ..Default::default()
            },
            Err(e) => return Err(StoreError::new("open", format!("{}: {}", path.display(), e))),
        };
        let store_id = fs::canonicalize(&path)
            .await
            .unwrap_or_else(|_| path.clone())
            .display()
            .to_string();
        Ok(Self {
            inner: MemoryTableStore::with_store_id(store_id, data),
            path,
        })
    }

    async fn persist(&self, operation: &'static str) -> Result<(), StoreError> {
        let data = self.inner.snapshot().await;
        let raw = serde_json::to_string_pretty(&data)
            .map_err(|e| StoreError::new(operation, e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::new(operation, e.to_string()))?;
        }
        fs::write(&self.path, raw)
            .await
            .map_err(|e| StoreError::new(operation, format!("{}: {}", self.path.display(), e)))?;
        debug!("Table written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl TableStore for JsonTableStore {
    fn store_id(&self) -> String {
        self.inner.store_id()
    }

    async fn name(&self) -> Result<String, StoreError> {
        self.inner.name().await
    }

    async fn list_row_ids(&self) -> Result<Vec<RowId>, StoreError> {
        self.inner.list_row_ids().await
    }

    async fn list_fields(&self) -> Result<Vec<Field>, StoreError> {
        self.inner.list_fields().await
    }

    async fn read_cell(&self, field_id: &str, row_id: &str) -> Result<CellValue, StoreError> {
        self.inner.read_cell(field_id, row_id).await
    }

    async fn create_row(&self, fields: HashMap<FieldId, String>) -> Result<RowId, StoreError> {
        let id = self.inner.create_row(fields).await?;
        self.persist("create_row").await?;
        Ok(id)
    }

    async fn update_cell(&self, field_id: &str, row_id: &str, value: String) -> Result<(), StoreError> {
        self.inner.update_cell(field_id, row_id, value).await?;
        self.persist("update_cell").await
    }

    async fn create_field(&self, name: &str, kind: FieldKind) -> Result<FieldId, StoreError> {
        let id = self.inner.create_field(name, kind).await?;
        self.persist("create_field").await?;
        Ok(id)
    }
}
