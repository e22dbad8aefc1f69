pub mod download_stock_data;
pub mod response_types;
pub mod serialize;
pub mod validate;
