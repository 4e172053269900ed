pub mod config;
pub mod database;
mod error;
pub mod query_repository;
pub mod source_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use query_repository::QueryRepository;
pub use source_repository::SourceRepository;
