pub mod api_check;
pub mod api_handle;
pub mod connections;
pub mod discovery;
pub mod token;
