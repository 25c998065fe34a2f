pub mod events;
pub mod history;
pub mod models;
pub mod presets;
pub mod request;
pub mod storage;
