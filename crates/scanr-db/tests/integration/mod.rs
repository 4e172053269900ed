pub mod common;
mod query_tests;
mod source_tests;
