//! Encoder and decoder for TAXII XML messages.

use crate::error::ProtocolError;
use crate::message::ProtocolMessage;
use crate::version::{ProtocolVersion, VersionAdapter};
use crate::xml::{parse_document, XmlWriter};

/// Message used when the body is not well-formed XML.
pub const INVALID_XML: &str = "Request was invalid XML";

/// Prefix of the message used when the body fails schema validation.
pub const SCHEMA_INVALID: &str = "Request was not schema valid";

/// Converts between request bodies and [`ProtocolMessage`]s for a set of
/// enabled protocol versions.
#[derive(Clone)]
pub struct Codec {
    adapters: Vec<&'static dyn VersionAdapter>,
}

impl Codec {
    /// Creates a codec with every supported version enabled.
    pub fn new() -> Self {
        Self::with_versions(&ProtocolVersion::ALL)
    }

    /// Creates a codec for the given versions only.
    pub fn with_versions(versions: &[ProtocolVersion]) -> Self {
        let mut adapters: Vec<&'static dyn VersionAdapter> = Vec::new();
        for version in versions {
            if !adapters.iter().any(|a| a.version() == *version) {
                adapters.push(version.adapter());
            }
        }
        Self { adapters }
    }

    /// Versions this codec accepts.
    pub fn versions(&self) -> Vec<ProtocolVersion> {
        self.adapters.iter().map(|a| a.version()).collect()
    }

    /// Resolves a message binding URN to an enabled version.
    pub fn version_for(&self, content_type: &str) -> Result<ProtocolVersion, ProtocolError> {
        let version = ProtocolVersion::from_message_binding(content_type)?;
        if self.adapters.iter().any(|a| a.version() == version) {
            Ok(version)
        } else {
            Err(ProtocolError::UnsupportedContentType(content_type.to_string()))
        }
    }

    /// Decodes a request body announced with the given message binding.
    pub fn decode(
        &self,
        content_type: &str,
        body: &[u8],
        validate: bool,
    ) -> Result<ProtocolMessage, ProtocolError> {
        let version = self.version_for(content_type)?;
        validate_and_parse(version, body, validate)
    }

    /// Encodes a message in its version's XML binding.
    pub fn encode(&self, message: &ProtocolMessage) -> Result<Vec<u8>, ProtocolError> {
        serialize(message)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a body in the given version, optionally checking it against the
/// version's schema first.
///
/// Every schema violation is reported, joined with `"; "`.
pub fn validate_and_parse(
    version: ProtocolVersion,
    body: &[u8],
    validate: bool,
) -> Result<ProtocolMessage, ProtocolError> {
    let adapter = version.adapter();

    let root = match parse_document(body) {
        Ok(root) => root,
        Err(e) => {
            tracing::error!(error = %e, version = %version, "Invalid XML received");
            return Err(ProtocolError::BadMessage {
                message: INVALID_XML.to_string(),
                source: Some(e),
            });
        }
    };

    if validate {
        let errors = adapter.schema().validate(&root);
        if !errors.is_empty() {
            return Err(ProtocolError::bad_message(format!(
                "{}: {}",
                SCHEMA_INVALID,
                errors.join("; ")
            )));
        }
    } else if root.namespace.as_deref() != Some(adapter.namespace()) {
        return Err(ProtocolError::bad_message(format!(
            "Element '{}' is not in the TAXII {} namespace",
            root.name, version
        )));
    }

    let message = adapter.parse(&root)?;
    Ok(ProtocolMessage { version, message })
}

/// Serializes a message as a complete XML document.
pub fn serialize(message: &ProtocolMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = XmlWriter::new();
    writer.declaration()?;
    message.version.adapter().write(&message.message, &mut writer)?;
    Ok(writer.into_inner())
}
