pub mod config;
pub mod error;
pub mod tenant;
pub mod transaction;
pub mod user;
