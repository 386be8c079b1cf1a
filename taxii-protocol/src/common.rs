//! Helpers shared by the version adapters.

use crate::error::ProtocolError;
use crate::status::StatusType;
use crate::xml::Element;

pub(crate) fn message_id(root: &Element) -> Result<String, ProtocolError> {
    root.required_attr("message_id").map(str::to_string)
}

pub(crate) fn in_response_to(root: &Element) -> Result<String, ProtocolError> {
    root.required_attr("in_response_to").map(str::to_string)
}

pub(crate) fn status_type(root: &Element) -> Result<StatusType, ProtocolError> {
    let value = root.required_attr("status_type")?;
    value.parse().map_err(ProtocolError::bad_message)
}

/// Content payload: markup children are kept as markup, otherwise the text.
pub(crate) fn content_text(content: &Element) -> Result<String, ProtocolError> {
    if content.has_element_children() {
        content.inner_xml().map_err(|e| ProtocolError::BadMessage {
            message: "Content could not be read".to_string(),
            source: Some(e),
        })
    } else {
        Ok(content.text())
    }
}

pub(crate) fn unexpected_root(root: &Element) -> ProtocolError {
    ProtocolError::bad_message(format!("Unknown message type '{}'", root.name))
}

pub(crate) fn unknown_value(element: &str, value: &str) -> ProtocolError {
    ProtocolError::bad_message(format!("Element '{element}': unknown value '{value}'"))
}

pub(crate) fn parse_u64(element: &Element) -> Result<u64, ProtocolError> {
    let text = element.text();
    text.parse().map_err(|_| {
        ProtocolError::bad_message(format!(
            "Element '{}': '{}' is not a number",
            element.name, text
        ))
    })
}
