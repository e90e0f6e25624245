//! Checkpoint store implementations

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileCheckpointStore;
pub use memory::MemoryCheckpointStore;
