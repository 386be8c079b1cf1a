//! Protocol versions and the adapters that hide their differences.
//!
//! Every `1.0 vs 1.1` decision in the crate goes through [`VersionAdapter`].
//! Callers hold a [`ProtocolVersion`] and ask it for its adapter; nothing
//! inspects message shapes to guess the version.

use crate::error::ProtocolError;
use crate::message::Message;
use crate::schema::Schema;
use crate::status::StatusType;
use crate::xml::{Element, XmlWriter};
use crate::{v10, v11};
use std::fmt;
use std::str::FromStr;

/// XML message binding for TAXII 1.0.
pub const VID_TAXII_XML_10: &str = "urn:taxii.mitre.org:message:xml:1.0";
/// XML message binding for TAXII 1.1.
pub const VID_TAXII_XML_11: &str = "urn:taxii.mitre.org:message:xml:1.1";
/// Services specification for TAXII 1.0.
pub const VID_TAXII_SERVICES_10: &str = "urn:taxii.mitre.org:services:1.0";
/// Services specification for TAXII 1.1.
pub const VID_TAXII_SERVICES_11: &str = "urn:taxii.mitre.org:services:1.1";
/// HTTP protocol binding.
pub const VID_TAXII_HTTP_10: &str = "urn:taxii.mitre.org:protocol:http:1.0";
/// HTTPS protocol binding.
pub const VID_TAXII_HTTPS_10: &str = "urn:taxii.mitre.org:protocol:https:1.0";

/// Supported TAXII protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V10,
    V11,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 2] = [ProtocolVersion::V10, ProtocolVersion::V11];

    /// Latest supported version, used when the request gives no usable hint.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V11;

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V10 => "1.0",
            ProtocolVersion::V11 => "1.1",
        }
    }

    /// Message binding URN (the `X-TAXII-Content-Type` value).
    pub fn message_binding(&self) -> &'static str {
        match self {
            ProtocolVersion::V10 => VID_TAXII_XML_10,
            ProtocolVersion::V11 => VID_TAXII_XML_11,
        }
    }

    /// Services URN (the `X-TAXII-Services` value).
    pub fn services(&self) -> &'static str {
        match self {
            ProtocolVersion::V10 => VID_TAXII_SERVICES_10,
            ProtocolVersion::V11 => VID_TAXII_SERVICES_11,
        }
    }

    /// Resolves a message binding URN.
    pub fn from_message_binding(content_type: &str) -> Result<Self, ProtocolError> {
        ProtocolVersion::ALL
            .into_iter()
            .find(|v| v.message_binding() == content_type.trim())
            .ok_or_else(|| ProtocolError::UnsupportedContentType(content_type.to_string()))
    }

    /// Returns the adapter for this version.
    pub fn adapter(&self) -> &'static dyn VersionAdapter {
        match self {
            ProtocolVersion::V10 => &v10::Taxii10,
            ProtocolVersion::V11 => &v11::Taxii11,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" | "10" | VID_TAXII_XML_10 => Ok(ProtocolVersion::V10),
            "1.1" | "11" | VID_TAXII_XML_11 => Ok(ProtocolVersion::V11),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(ProtocolVersion::V10),
            11 => Ok(ProtocolVersion::V11),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl serde::Serialize for ProtocolVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ProtocolVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How content bindings are compared in a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSemantics {
    /// Only the binding identifier exists (TAXII 1.0).
    IdentifierOnly,
    /// Identifier plus one subtype (TAXII 1.1).
    IdentifierAndSubtype,
}

/// Everything that differs between TAXII versions.
pub trait VersionAdapter: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    /// XML namespace of the message binding.
    fn namespace(&self) -> &'static str;

    /// Prefix bound to [`VersionAdapter::namespace`] in written documents.
    fn prefix(&self) -> &'static str;

    fn binding_semantics(&self) -> BindingSemantics;

    /// Maps a status onto one the version defines.
    fn status_type(&self, status: StatusType) -> StatusType;

    /// Structural schema used to validate incoming documents.
    fn schema(&self) -> &'static Schema;

    /// Builds a message from a document root. The root namespace has already
    /// been checked against [`VersionAdapter::namespace`].
    fn parse(&self, root: &Element) -> Result<Message, ProtocolError>;

    /// Writes a message as the document root.
    fn write(&self, message: &Message, writer: &mut XmlWriter) -> Result<(), ProtocolError>;
}
