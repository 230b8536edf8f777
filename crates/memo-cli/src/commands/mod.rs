pub mod add;
pub mod common;
pub mod config;
pub mod delete;
pub mod edit;
pub mod list;
pub mod organize;
pub mod provider;
pub mod settings;
pub mod sync;
