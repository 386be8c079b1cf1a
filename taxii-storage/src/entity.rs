//! Stored entities.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taxii_protocol::{
    is_supported, CollectionType, ContentBinding, ProtocolVersion, ServiceType, VID_TAXII_HTTP_10,
};

fn default_true() -> bool {
    true
}

fn default_protocol_bindings() -> Vec<String> {
    vec![VID_TAXII_HTTP_10.to_string()]
}

/// A configured TAXII service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// Path the service answers on, e.g. `/services/inbox`.
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authentication_required: bool,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default = "default_protocol_bindings")]
    pub protocol_bindings: Vec<String>,
    /// Inbox only. Empty accepts any content.
    #[serde(default)]
    pub supported_content: Vec<ContentBinding>,
    /// Inbox only. Requires 1.1 clients to name destination collections.
    #[serde(default)]
    pub destination_collection_required: bool,
    /// Discovery only. Ids of the services to advertise; empty advertises all.
    #[serde(default)]
    pub advertised_services: Vec<String>,
    /// Poll only. Caps the number of blocks in one response.
    #[serde(default)]
    pub max_result_count: Option<usize>,
}

impl ServiceDefinition {
    pub fn new(
        id: impl Into<String>,
        service_type: ServiceType,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_type,
            address: address.into(),
            description: String::new(),
            authentication_required: false,
            available: true,
            protocol_bindings: default_protocol_bindings(),
            supported_content: Vec::new(),
            destination_collection_required: false,
            advertised_services: Vec::new(),
            max_result_count: None,
        }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.id.trim().is_empty() {
            return Err(StorageError::InvalidDefinition(
                "service id must not be empty".to_string(),
            ));
        }
        if !self.address.starts_with('/') {
            return Err(StorageError::InvalidDefinition(format!(
                "service '{}': address '{}' must start with '/'",
                self.id, self.address
            )));
        }
        if self.protocol_bindings.is_empty() {
            return Err(StorageError::InvalidDefinition(format!(
                "service '{}': at least one protocol binding is required",
                self.id
            )));
        }
        Ok(())
    }
}

/// A configured collection (TAXII 1.0: feed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub collection_type: CollectionType,
    #[serde(default = "default_true")]
    pub available: bool,
    /// Empty accepts any content.
    #[serde(default)]
    pub supported_content: Vec<ContentBinding>,
    /// Services (inbox, poll, collection management) the collection is
    /// attached to.
    #[serde(default)]
    pub service_ids: Vec<String>,
}

impl CollectionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            collection_type: CollectionType::DataFeed,
            available: true,
            supported_content: Vec::new(),
            service_ids: Vec::new(),
        }
    }

    pub fn with_services<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_attached_to(&self, service_id: &str) -> bool {
        self.service_ids.iter().any(|id| id == service_id)
    }
}

/// A stored content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockEntity {
    /// Assigned by the store.
    #[serde(default)]
    pub id: u64,
    pub content: String,
    pub binding: ContentBinding,
    #[serde(default)]
    pub message: Option<String>,
    pub timestamp_label: DateTime<Utc>,
    #[serde(default)]
    pub inbox_message_id: Option<u64>,
}

impl ContentBlockEntity {
    pub fn new(
        binding: ContentBinding,
        content: impl Into<String>,
        timestamp_label: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            content: content.into(),
            binding,
            message: None,
            timestamp_label,
            inbox_message_id: None,
        }
    }
}

/// Record of a received inbox message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessageEntity {
    /// Assigned by the store.
    #[serde(default)]
    pub id: u64,
    pub message_id: String,
    pub service_id: String,
    #[serde(default)]
    pub message: Option<String>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub destination_collections: Vec<String>,
    #[serde(default)]
    pub record_count: Option<u64>,
    #[serde(default)]
    pub partial_count: bool,
    pub content_block_count: usize,
}

/// Filter for polling a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollQuery {
    /// Exclusive lower bound on the timestamp label.
    pub begin: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the timestamp label.
    pub end: Option<DateTime<Utc>>,
    /// Accepted bindings; empty accepts all.
    pub bindings: Vec<ContentBinding>,
    /// Maximum number of blocks to return.
    pub limit: Option<usize>,
}

impl PollQuery {
    /// Returns whether a block falls inside the query's window and bindings.
    pub fn matches(&self, block: &ContentBlockEntity) -> bool {
        if self.begin.is_some_and(|b| block.timestamp_label <= b) {
            return false;
        }
        if self.end.is_some_and(|e| block.timestamp_label > e) {
            return false;
        }
        self.bindings.is_empty()
            || is_supported(&self.bindings, &block.binding, ProtocolVersion::V11)
    }
}

/// Blocks returned by a poll, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollResult {
    pub blocks: Vec<ContentBlockEntity>,
    /// Number of matching blocks before the limit was applied.
    pub total: usize,
}

impl PollResult {
    pub fn is_partial(&self) -> bool {
        self.blocks.len() < self.total
    }
}
