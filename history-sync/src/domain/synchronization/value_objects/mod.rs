pub mod cell_value;
pub mod sample;
pub mod sync_config;
