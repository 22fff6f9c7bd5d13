pub mod api;
pub mod booking;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod shutdown;
pub mod store;
pub mod worker;
