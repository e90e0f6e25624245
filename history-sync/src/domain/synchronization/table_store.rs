//! Table Store
//! The capability set the engine needs from a host table (source or target).
//! Implementations never have rows or fields deleted by the engine.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::errors::StoreError;

use super::value_objects::cell_value::CellValue;

pub type RowId = String;
pub type FieldId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    DateTime,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Stable handle identity; two stores with the same id point at the same table.
    fn store_id(&self) -> String;

    async fn name(&self) -> Result<String, StoreError>;

    async fn list_row_ids(&self) -> Result<Vec<RowId>, StoreError>;

    async fn list_fields(&self) -> Result<Vec<Field>, StoreError>;

    async fn read_cell(&self, field_id: &str, row_id: &str) -> Result<CellValue, StoreError>;

    async fn create_row(&self, fields: HashMap<FieldId, String>) -> Result<RowId, StoreError>;

    async fn update_cell(&self, field_id: &str, row_id: &str, value: String)
        -> Result<(), StoreError>;

    async fn create_field(&self, name: &str, kind: FieldKind) -> Result<FieldId, StoreError>;
}

pub fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    fields.iter().find(|field| field.name == name)
}
