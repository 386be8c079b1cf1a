//! TAXII message types.
//!
//! These are the single internal representation shared by both protocol
//! versions. The version adapters in [`crate::v10`] and [`crate::v11`]
//! translate between these and the version-specific XML shapes.

use crate::binding::ContentBinding;
use crate::status::StatusType;
use crate::version::ProtocolVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message id used in `in_response_to` when the request id is unknown.
pub const UNKNOWN_MESSAGE_ID: &str = "0";

/// Generates a fresh message id.
pub fn generate_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// TAXII service roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Inbox,
    Poll,
    Discovery,
    /// Rendered as FEED_MANAGEMENT in TAXII 1.0.
    CollectionManagement,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Inbox,
        ServiceType::Poll,
        ServiceType::Discovery,
        ServiceType::CollectionManagement,
    ];
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceType::Inbox => "inbox",
            ServiceType::Poll => "poll",
            ServiceType::Discovery => "discovery",
            ServiceType::CollectionManagement => "collection_management",
        };
        f.write_str(name)
    }
}

/// Collection kinds (TAXII 1.1). TAXII 1.0 feeds are always data feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionType {
    #[default]
    DataFeed,
    DataSet,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::DataFeed => "DATA_FEED",
            CollectionType::DataSet => "DATA_SET",
        }
    }
}

/// Requested poll response shape (TAXII 1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Full,
    CountOnly,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Full => "FULL",
            ResponseType::CountOnly => "COUNT_ONLY",
        }
    }
}

/// A unit of content exchanged through inbox and poll services.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub content_binding: ContentBinding,
    pub content: String,
    pub timestamp_label: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub padding: Option<String>,
}

impl ContentBlock {
    pub fn new(content_binding: ContentBinding, content: impl Into<String>) -> Self {
        Self {
            content_binding,
            content: content.into(),
            timestamp_label: None,
            message: None,
            padding: None,
        }
    }

    pub fn with_timestamp_label(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp_label = Some(timestamp);
        self
    }
}

/// One advertised service in a discovery response.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInstance {
    pub service_type: ServiceType,
    pub available: bool,
    pub protocol_binding: String,
    pub address: String,
    pub message_bindings: Vec<String>,
    /// Accepted content for inbox services.
    pub content_bindings: Vec<ContentBinding>,
    pub message: Option<String>,
}

/// Where a collection can be polled or pushed to.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEndpoint {
    pub protocol_binding: String,
    pub address: String,
    pub message_bindings: Vec<String>,
    /// Accepted content, only meaningful for receiving inboxes.
    pub content_bindings: Vec<ContentBinding>,
}

/// Description of a collection (TAXII 1.0: feed).
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInformation {
    pub name: String,
    pub collection_type: CollectionType,
    pub available: bool,
    pub description: String,
    pub volume: Option<u64>,
    pub content_bindings: Vec<ContentBinding>,
    pub polling_services: Vec<ServiceEndpoint>,
    pub receiving_inboxes: Vec<ServiceEndpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryResponse {
    pub message_id: String,
    pub in_response_to: String,
    pub service_instances: Vec<ServiceInstance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboxMessage {
    pub message_id: String,
    pub message: Option<String>,
    /// TAXII 1.1 only.
    pub destination_collection_names: Vec<String>,
    /// TAXII 1.1 only.
    pub record_count: Option<RecordCount>,
    pub content_blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCount {
    pub count: u64,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollRequest {
    pub message_id: String,
    /// Collection name (TAXII 1.0: feed name).
    pub collection_name: String,
    pub subscription_id: Option<String>,
    pub exclusive_begin_timestamp: Option<DateTime<Utc>>,
    pub inclusive_end_timestamp: Option<DateTime<Utc>>,
    /// Bindings the client is willing to receive; empty means any.
    pub content_bindings: Vec<ContentBinding>,
    pub allow_asynch: bool,
    pub response_type: ResponseType,
}

impl PollRequest {
    pub fn new(message_id: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            collection_name: collection_name.into(),
            subscription_id: None,
            exclusive_begin_timestamp: None,
            inclusive_end_timestamp: None,
            content_bindings: Vec::new(),
            allow_asynch: false,
            response_type: ResponseType::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollResponse {
    pub message_id: String,
    pub in_response_to: String,
    pub collection_name: String,
    pub subscription_id: Option<String>,
    /// Exclusive in TAXII 1.1, inclusive in TAXII 1.0.
    pub begin_timestamp: Option<DateTime<Utc>>,
    pub inclusive_end_timestamp: DateTime<Utc>,
    pub more: bool,
    pub result_id: Option<String>,
    pub result_part_number: u32,
    pub record_count: Option<RecordCount>,
    pub message: Option<String>,
    pub content_blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInformationRequest {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInformationResponse {
    pub message_id: String,
    pub in_response_to: String,
    pub collections: Vec<CollectionInformation>,
}

/// Named detail attached to a status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDetail {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message_id: String,
    pub in_response_to: String,
    pub status_type: StatusType,
    pub details: Vec<StatusDetail>,
    pub message: Option<String>,
}

impl StatusMessage {
    pub fn new(in_response_to: impl Into<String>, status_type: StatusType) -> Self {
        Self {
            message_id: generate_message_id(),
            in_response_to: in_response_to.into(),
            status_type,
            details: Vec::new(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.push(StatusDetail {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// Kind of a TAXII message, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DiscoveryRequest,
    DiscoveryResponse,
    InboxMessage,
    PollRequest,
    PollResponse,
    CollectionInformationRequest,
    CollectionInformationResponse,
    StatusMessage,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::DiscoveryRequest => "discovery_request",
            MessageKind::DiscoveryResponse => "discovery_response",
            MessageKind::InboxMessage => "inbox_message",
            MessageKind::PollRequest => "poll_request",
            MessageKind::PollResponse => "poll_response",
            MessageKind::CollectionInformationRequest => "collection_information_request",
            MessageKind::CollectionInformationResponse => "collection_information_response",
            MessageKind::StatusMessage => "status_message",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A TAXII message of either version.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    DiscoveryRequest(DiscoveryRequest),
    DiscoveryResponse(DiscoveryResponse),
    InboxMessage(InboxMessage),
    PollRequest(PollRequest),
    PollResponse(PollResponse),
    CollectionInformationRequest(CollectionInformationRequest),
    CollectionInformationResponse(CollectionInformationResponse),
    StatusMessage(StatusMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::DiscoveryRequest(_) => MessageKind::DiscoveryRequest,
            Message::DiscoveryResponse(_) => MessageKind::DiscoveryResponse,
            Message::InboxMessage(_) => MessageKind::InboxMessage,
            Message::PollRequest(_) => MessageKind::PollRequest,
            Message::PollResponse(_) => MessageKind::PollResponse,
            Message::CollectionInformationRequest(_) => MessageKind::CollectionInformationRequest,
            Message::CollectionInformationResponse(_) => {
                MessageKind::CollectionInformationResponse
            }
            Message::StatusMessage(_) => MessageKind::StatusMessage,
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Message::DiscoveryRequest(m) => &m.message_id,
            Message::DiscoveryResponse(m) => &m.message_id,
            Message::InboxMessage(m) => &m.message_id,
            Message::PollRequest(m) => &m.message_id,
            Message::PollResponse(m) => &m.message_id,
            Message::CollectionInformationRequest(m) => &m.message_id,
            Message::CollectionInformationResponse(m) => &m.message_id,
            Message::StatusMessage(m) => &m.message_id,
        }
    }
}

impl From<StatusMessage> for Message {
    fn from(m: StatusMessage) -> Self {
        Message::StatusMessage(m)
    }
}

/// A message tagged with the protocol version it was read in or will be
/// written in.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub version: ProtocolVersion,
    pub message: Message,
}

impl ProtocolMessage {
    pub fn new(version: ProtocolVersion, message: impl Into<Message>) -> Self {
        Self {
            version,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn message_id(&self) -> &str {
        self.message.message_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_builder() {
        let status = StatusMessage::new("42", StatusType::UnsupportedContent)
            .with_message("no common binding")
            .with_detail("SUPPORTED_CONTENT", ["b1", "b2"]);

        assert_eq!(status.in_response_to, "42");
        assert!(!status.message_id.is_empty());
        assert_eq!(status.details.len(), 1);
        assert_eq!(status.details[0].values, vec!["b1", "b2"]);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_message_id(), generate_message_id());
    }

    #[test]
    fn test_message_kind() {
        let msg = ProtocolMessage::new(
            ProtocolVersion::V11,
            Message::DiscoveryRequest(DiscoveryRequest {
                message_id: "1".to_string(),
            }),
        );
        assert_eq!(msg.kind(), MessageKind::DiscoveryRequest);
        assert_eq!(msg.message_id(), "1");
        assert_eq!(msg.kind().to_string(), "discovery_request");
    }
}
