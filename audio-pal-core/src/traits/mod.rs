pub mod callback;
pub mod monitor;
pub mod session;
