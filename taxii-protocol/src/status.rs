//! TAXII status types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome codes carried by a status message.
///
/// The set is the TAXII 1.1 one. TAXII 1.0 knows the first twelve; the
/// version adapter folds the remainder into [`StatusType::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusType {
    Success,
    BadMessage,
    Denied,
    Failure,
    NotFound,
    PollingUnsupported,
    Retry,
    Unauthorized,
    UnsupportedMessage,
    UnsupportedContent,
    UnsupportedProtocol,
    UnsupportedQuery,

    // TAXII 1.1 only
    AsynchronousPollError,
    DestinationCollectionError,
    InvalidResponsePart,
    NetworkError,
    Pending,
}

impl StatusType {
    /// Wire value of the status type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusType::Success => "SUCCESS",
            StatusType::BadMessage => "BAD_MESSAGE",
            StatusType::Denied => "DENIED",
            StatusType::Failure => "FAILURE",
            StatusType::NotFound => "NOT_FOUND",
            StatusType::PollingUnsupported => "POLLING_UNSUPPORTED",
            StatusType::Retry => "RETRY",
            StatusType::Unauthorized => "UNAUTHORIZED",
            StatusType::UnsupportedMessage => "UNSUPPORTED_MESSAGE",
            StatusType::UnsupportedContent => "UNSUPPORTED_CONTENT",
            StatusType::UnsupportedProtocol => "UNSUPPORTED_PROTOCOL",
            StatusType::UnsupportedQuery => "UNSUPPORTED_QUERY",
            StatusType::AsynchronousPollError => "ASYNCHRONOUS_POLL_ERROR",
            StatusType::DestinationCollectionError => "DESTINATION_COLLECTION_ERROR",
            StatusType::InvalidResponsePart => "INVALID_RESPONSE_PART",
            StatusType::NetworkError => "NETWORK_ERROR",
            StatusType::Pending => "PENDING",
        }
    }

    /// Returns whether the status exists in TAXII 1.0.
    pub fn is_defined_in_v10(&self) -> bool {
        !matches!(
            self,
            StatusType::AsynchronousPollError
                | StatusType::DestinationCollectionError
                | StatusType::InvalidResponsePart
                | StatusType::NetworkError
                | StatusType::Pending
        )
    }

    pub fn is_success(&self) -> bool {
        *self == StatusType::Success
    }

    pub const ALL: [StatusType; 17] = [
        StatusType::Success,
        StatusType::BadMessage,
        StatusType::Denied,
        StatusType::Failure,
        StatusType::NotFound,
        StatusType::PollingUnsupported,
        StatusType::Retry,
        StatusType::Unauthorized,
        StatusType::UnsupportedMessage,
        StatusType::UnsupportedContent,
        StatusType::UnsupportedProtocol,
        StatusType::UnsupportedQuery,
        StatusType::AsynchronousPollError,
        StatusType::DestinationCollectionError,
        StatusType::InvalidResponsePart,
        StatusType::NetworkError,
        StatusType::Pending,
    ];
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusType::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown status type '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all() {
        for status in StatusType::ALL {
            assert_eq!(status.as_str().parse::<StatusType>().unwrap(), status);
        }
        assert!("NOPE".parse::<StatusType>().is_err());
    }

    #[test]
    fn test_v10_subset() {
        let defined = StatusType::ALL
            .iter()
            .filter(|s| s.is_defined_in_v10())
            .count();
        assert_eq!(defined, 12);
        assert!(!StatusType::DestinationCollectionError.is_defined_in_v10());
        assert!(StatusType::Unauthorized.is_defined_in_v10());
    }

    #[test]
    fn test_serde_name() {
        let json = serde_json::to_string(&StatusType::BadMessage).unwrap();
        assert_eq!(json, "\"BAD_MESSAGE\"");
    }
}
