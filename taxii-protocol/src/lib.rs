//! # taxii-protocol
//!
//! TAXII 1.0 and 1.1 message model and XML binding.
//!
//! This crate provides:
//! - A version-neutral message model shared by both protocol versions
//! - Content binding matching and negotiation
//! - XML decoding with structural schema validation, and encoding
//! - Version adapters isolating every 1.0/1.1 difference

pub mod binding;
pub mod codec;
mod common;
pub mod error;
pub mod message;
pub mod schema;
pub mod status;
pub mod v10;
pub mod v11;
pub mod version;
pub mod xml;

pub use binding::{intersect, is_supported, ContentBinding};
pub use codec::{serialize, validate_and_parse, Codec};
pub use error::{ProtocolError, XmlError};
pub use message::{
    generate_message_id, CollectionInformation, CollectionInformationRequest,
    CollectionInformationResponse, CollectionType, ContentBlock, DiscoveryRequest,
    DiscoveryResponse, InboxMessage, Message, MessageKind, PollRequest, PollResponse,
    ProtocolMessage, RecordCount, ResponseType, ServiceEndpoint, ServiceInstance, ServiceType,
    StatusDetail, StatusMessage, UNKNOWN_MESSAGE_ID,
};
pub use status::StatusType;
pub use version::{
    BindingSemantics, ProtocolVersion, VersionAdapter, VID_TAXII_HTTPS_10, VID_TAXII_HTTP_10,
    VID_TAXII_SERVICES_10, VID_TAXII_SERVICES_11, VID_TAXII_XML_10, VID_TAXII_XML_11,
};

/// Content type of every TAXII HTTP body.
pub const HTTP_CONTENT_TYPE: &str = "application/xml";
