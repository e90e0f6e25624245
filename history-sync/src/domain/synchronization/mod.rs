pub mod checkpoint;
pub mod history_fetcher;
pub mod identifier;
pub mod sync_progress;
pub mod table_store;
pub mod value_objects;
