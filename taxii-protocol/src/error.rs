//! Protocol error types.

use thiserror::Error;

/// Low-level XML failures, either from the tokenizer or from the tree builder.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in document")]
    InvalidUtf8,

    #[error("{0}")]
    Structure(String),
}

/// Errors raised while decoding or encoding TAXII messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    /// The request could not be turned into a TAXII message.
    #[error("{message}")]
    BadMessage {
        message: String,
        #[source]
        source: Option<XmlError>,
    },

    #[error("cannot encode message: {0}")]
    Encode(#[from] XmlError),

    /// The message kind has no representation in the requested version.
    #[error("{message} is not defined for TAXII {version}")]
    NotRepresentable {
        message: &'static str,
        version: &'static str,
    },
}

impl ProtocolError {
    /// Creates a bad message error without an underlying XML cause.
    pub fn bad_message(message: impl Into<String>) -> Self {
        ProtocolError::BadMessage {
            message: message.into(),
            source: None,
        }
    }

    /// Returns whether the error came from the request contents.
    pub fn is_bad_message(&self) -> bool {
        matches!(self, ProtocolError::BadMessage { .. })
    }
}
