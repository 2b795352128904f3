pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod query;
pub mod registry;
pub mod schema;
pub mod store;
