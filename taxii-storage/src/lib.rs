//! # taxii-storage
//!
//! Storage layer for taxiid.
//!
//! This crate provides:
//! - The `Persistence` interface the server's handlers are written against
//! - Service, collection, inbox message and content block entities
//! - An in-memory implementation with optional JSON snapshots

pub mod api;
pub mod entity;
pub mod error;
pub mod memory;

pub use api::Persistence;
pub use entity::{
    CollectionDefinition, ContentBlockEntity, InboxMessageEntity, PollQuery, PollResult,
    ServiceDefinition,
};
pub use error::StorageError;
pub use memory::MemoryStore;
