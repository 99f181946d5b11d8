pub mod config;
pub mod error;
pub mod policy;
pub mod suite;
pub mod types;
