//! Table store implementations

pub mod json_file;
pub mod memory;

pub use json_file::JsonTableStore;
pub use memory::{MemoryTableStore, Row, TableData};
