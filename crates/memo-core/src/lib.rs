//! memo-core - Core library for memo
//!
//! This crate contains the note and settings models, the local store, the
//! remote adapters for D1 and Supabase, and the sync engine shared by every
//! memo interface.

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
