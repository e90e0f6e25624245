pub mod batch;
pub mod history_api;
pub mod request;
pub mod wire;
