pub mod config;
pub mod controls;
pub mod device;
pub mod error;
pub mod events;
pub mod params;
pub mod state;
pub mod stream_attributes;
