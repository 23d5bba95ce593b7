pub mod concurrency;
pub mod device_table;
pub mod policy;
