//! In-memory table store
//! A host table held entirely in memory. Used by the integration tests and as the
//! backing structure of the file-backed store.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::errors::StoreError,
    domain::synchronization::{
        table_store::{find_field, Field, FieldId, FieldKind, RowId, TableStore},
        value_objects::cell_value::CellValue,
    },
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub cells: HashMap<FieldId, CellValue>,
}

/// Serializable content of a table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableData {
    pub name: String,
    pub fields: Vec<Field>,
    pub rows: Vec<Row>,
}

#[derive(Debug)]
pub struct MemoryTableStore {
    store_id: String,
    data: Mutex<TableData>,
    read_only: AtomicBool,
}

fn new_id(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

impl MemoryTableStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_data(TableData {
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn from_data(data: TableData) -> Self {
        Self::with_store_id(new_id("tbl"), data)
    }

    pub fn with_store_id(store_id: impl Into<String>, data: TableData) -> Self {
        Self {
            store_id: store_id.into(),
            data: Mutex::new(data),
            read_only: AtomicBool::new(false),
        }
    }

    /// A read-only table rejects every mutation, like a table the user lacks edit rights on.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> TableData {
        self.data.lock().await.clone()
    }

    /// Appends a row given cells keyed by field name, creating text fields as needed.
    pub async fn insert_named(&self, cells: Vec<(&str, CellValue)>) -> RowId {
        let mut data = self.data.lock().await;
        let mut row = Row {
            id: new_id("rec"),
            cells: HashMap::new(),
        };
        for (name, value) in cells {
            let field_id = match find_field(&data.fields, name) {
                Some(field) => field.id.clone(),
                None => {
                    let field = Field {
                        id: new_id("fld"),
                        name: name.to_string(),
                        kind: FieldKind::Text,
                    };
                    let id = field.id.clone();
                    data.fields.push(field);
                    id
                }
            };
            row.cells.insert(field_id, value);
        }
        let id = row.id.clone();
        data.rows.push(row);
        id
    }

    /// Rows with cells keyed by field name, in insertion order.
    pub async fn rows_by_name(&self) -> Vec<HashMap<String, CellValue>> {
        let data = self.data.lock().await;
        let names: HashMap<&str, &str> = data
            .fields
            .iter()
            .map(|f| (f.id.as_str(), f.name.as_str()))
            .collect();
        data.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .filter_map(|(id, value)| {
                        names.get(id.as_str()).map(|name| (name.to_string(), value.clone()))
                    })
                    .collect()
            })
            .collect()
    }

    fn ensure_writable(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::new(operation, "table is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    fn store_id(&self) -> String {
        self.store_id.clone()
    }

    async fn name(&self) -> Result<String, StoreError> {
        Ok(self.data.lock().await.name.clone())
    }

    async fn list_row_ids(&self) -> Result<Vec<RowId>, StoreError> {
        Ok(self.data.lock().await.rows.iter().map(|r| r.id.clone()).collect())
    }

    async fn list_fields(&self) -> Result<Vec<Field>, StoreError> {
        Ok(self.data.lock().await.fields.clone())
    }

    async fn read_cell(&self, field_id: &str, row_id: &str) -> Result<CellValue, StoreError> {
        let data = self.data.lock().await;
        if !data.fields.iter().any(|f| f.id == field_id) {
            return Err(StoreError::new("read_cell", format!("unknown field {}", field_id)));
        }
        let row = data
            .rows
            .iter()
            .find(|r| r.id == row_id)
            .ok_or_else(|| StoreError::new("read_cell", format!("unknown row {}", row_id)))?;
        Ok(row.cells.get(field_id).cloned().unwrap_or_default())
    }

    async fn create_row(&self, fields: HashMap<FieldId, String>) -> Result<RowId, StoreError> {
        self.ensure_writable("create_row")?;
        let mut data = self.data.lock().await;
        if let Some(unknown) = fields.keys().find(|id| !data.fields.iter().any(|f| &f.id == *id)) {
            return Err(StoreError::new("create_row", format!("unknown field {}", unknown)));
        }
        let row = Row {
            id: new_id("rec"),
            cells: fields
                .into_iter()
                .map(|(id, value)| (id, CellValue::text(value)))
                .collect(),
        };
        let id = row.id.clone();
        data.rows.push(row);
        Ok(id)
    }

    async fn update_cell(&self, field_id: &str, row_id: &str, value: String) -> Result<(), StoreError> {
        self.ensure_writable("update_cell")?;
        let mut data = self.data.lock().await;
        if !data.fields.iter().any(|f| f.id == field_id) {
            return Err(StoreError::new("update_cell", format!("unknown field {}", field_id)));
        }
        let row = data
            .rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or_else(|| StoreError::new("update_cell", format!("unknown row {}", row_id)))?;
        row.cells.insert(field_id.to_string(), CellValue::text(value));
        Ok(())
    }

    async fn create_field(&self, name: &str, kind: FieldKind) -> Result<FieldId, StoreError> {
        self.ensure_writable("create_field")?;
        let mut data = self.data.lock().await;
        if find_field(&data.fields, name).is_some() {
            return Err(StoreError::new("create_field", format!("field '{}' already exists", name)));
        }
        let field = Field {
            id: new_id("fld"),
            name: name.to_string(),
            kind,
        };
        let id = field.id.clone();
        data.fields.push(field);
        Ok(id)
    }
}
