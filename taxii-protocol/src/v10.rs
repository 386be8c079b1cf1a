//! TAXII 1.0 XML message binding.
//!
//! 1.0 calls collections feeds, has no content subtypes and carries status
//! details as plain text. Fields of the shared message types that 1.0 cannot
//! express are dropped when writing and left empty when reading. Messages
//! whose meaning depends on such fields are refused.

use crate::binding::ContentBinding;
use crate::common::{
    content_text, in_response_to, message_id, status_type, unexpected_root, unknown_value,
};
use crate::error::{ProtocolError, XmlError};
use crate::message::*;
use crate::schema::{AttributeRule, ChildRule, ContentModel, ElementRule, Schema, ValueType};
use crate::status::StatusType;
use crate::version::{BindingSemantics, ProtocolVersion, VersionAdapter};
use crate::xml::{bool_attr, datetime_child, format_bool, format_datetime, Element, XmlWriter};

/// Namespace of the TAXII 1.0 XML message binding.
pub const NAMESPACE: &str = "http://taxii.mitre.org/messages/taxii_xml_binding-1";
const PREFIX: &str = "taxii";

const SERVICE_TYPES: &[&str] = &[
    "INBOX",
    "POLL",
    "DISCOVERY",
    "FEED_MANAGEMENT",
    "SUBSCRIPTION_MANAGEMENT",
];

const STATUS_TYPES: &[&str] = &[
    "SUCCESS",
    "BAD_MESSAGE",
    "DENIED",
    "FAILURE",
    "NOT_FOUND",
    "POLLING_UNSUPPORTED",
    "RETRY",
    "UNAUTHORIZED",
    "UNSUPPORTED_MESSAGE",
    "UNSUPPORTED_CONTENT",
    "UNSUPPORTED_PROTOCOL",
    "UNSUPPORTED_QUERY",
];

/// Adapter for TAXII 1.0.
pub struct Taxii10;

impl VersionAdapter for Taxii10 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V10
    }

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn prefix(&self) -> &'static str {
        PREFIX
    }

    fn binding_semantics(&self) -> BindingSemantics {
        BindingSemantics::IdentifierOnly
    }

    fn status_type(&self, status: StatusType) -> StatusType {
        if status.is_defined_in_v10() {
            status
        } else {
            StatusType::Failure
        }
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn parse(&self, root: &Element) -> Result<Message, ProtocolError> {
        let message = match root.name.as_str() {
            "Discovery_Request" => Message::DiscoveryRequest(DiscoveryRequest {
                message_id: message_id(root)?,
            }),
            "Discovery_Response" => Message::DiscoveryResponse(DiscoveryResponse {
                message_id: message_id(root)?,
                in_response_to: in_response_to(root)?,
                service_instances: root
                    .children_named("Service_Instance")
                    .map(parse_service_instance)
                    .collect::<Result<_, _>>()?,
            }),
            "Inbox_Message" => Message::InboxMessage(InboxMessage {
                message_id: message_id(root)?,
                message: root.child_text("Message"),
                destination_collection_names: Vec::new(),
                record_count: None,
                content_blocks: root
                    .children_named("Content_Block")
                    .map(parse_content_block)
                    .collect::<Result<_, _>>()?,
            }),
            "Poll_Request" => Message::PollRequest(parse_poll_request(root)?),
            "Poll_Response" => Message::PollResponse(parse_poll_response(root)?),
            "Feed_Information_Request" => {
                Message::CollectionInformationRequest(CollectionInformationRequest {
                    message_id: message_id(root)?,
                })
            }
            "Feed_Information_Response" => {
                Message::CollectionInformationResponse(CollectionInformationResponse {
                    message_id: message_id(root)?,
                    in_response_to: in_response_to(root)?,
                    collections: root
                        .children_named("Feed")
                        .map(parse_feed)
                        .collect::<Result<_, _>>()?,
                })
            }
            "Status_Message" => {
                let details = match root.child_text("Status_Detail") {
                    Some(text) if !text.is_empty() => vec![StatusDetail {
                        name: String::new(),
                        values: vec![text],
                    }],
                    _ => Vec::new(),
                };
                Message::StatusMessage(StatusMessage {
                    message_id: message_id(root)?,
                    in_response_to: in_response_to(root)?,
                    status_type: status_type(root)?,
                    details,
                    message: root.child_text("Message"),
                })
            }
            _ => return Err(unexpected_root(root)),
        };
        Ok(message)
    }

    fn write(&self, message: &Message, writer: &mut XmlWriter) -> Result<(), ProtocolError> {
        let mut out = Out { w: writer };
        match message {
            Message::DiscoveryRequest(m) => out.discovery_request(m)?,
            Message::DiscoveryResponse(m) => out.discovery_response(m)?,
            Message::InboxMessage(m) => out.inbox_message(m)?,
            Message::PollRequest(m) => {
                if m.response_type == ResponseType::CountOnly {
                    return Err(not_representable("Count-only poll request"));
                }
                out.poll_request(m)?
            }
            Message::PollResponse(m) => {
                if m.more || m.result_id.is_some() || m.result_part_number != 1 {
                    return Err(not_representable("Multi-part poll response"));
                }
                out.poll_response(m)?
            }
            Message::CollectionInformationRequest(m) => out.feed_request(m)?,
            Message::CollectionInformationResponse(m) => out.feed_response(m)?,
            Message::StatusMessage(m) => {
                let status = self.status_type(m.status_type);
                out.status_message(m, status)?
            }
        }
        Ok(())
    }
}

fn not_representable(message: &'static str) -> ProtocolError {
    ProtocolError::NotRepresentable {
        message,
        version: ProtocolVersion::V10.as_str(),
    }
}

fn service_type_name(service_type: ServiceType) -> &'static str {
    match service_type {
        ServiceType::Inbox => "INBOX",
        ServiceType::Poll => "POLL",
        ServiceType::Discovery => "DISCOVERY",
        ServiceType::CollectionManagement => "FEED_MANAGEMENT",
    }
}

fn parse_service_type(value: &str) -> Result<ServiceType, ProtocolError> {
    match value {
        "INBOX" => Ok(ServiceType::Inbox),
        "POLL" => Ok(ServiceType::Poll),
        "DISCOVERY" => Ok(ServiceType::Discovery),
        "FEED_MANAGEMENT" => Ok(ServiceType::CollectionManagement),
        other => Err(unknown_value("Service_Instance", other)),
    }
}

fn content_bindings(element: &Element) -> Vec<ContentBinding> {
    element
        .children_text("Content_Binding")
        .into_iter()
        .map(ContentBinding::new)
        .collect()
}

fn required_text(element: &Element, name: &str) -> Result<String, ProtocolError> {
    element.required_child(name).map(Element::text)
}

fn parse_content_block(element: &Element) -> Result<ContentBlock, ProtocolError> {
    Ok(ContentBlock {
        content_binding: ContentBinding::new(required_text(element, "Content_Binding")?),
        content: content_text(element.required_child("Content")?)?,
        timestamp_label: datetime_child(element, "Timestamp_Label")?,
        message: None,
        padding: element.child_text("Padding"),
    })
}

fn parse_service_instance(element: &Element) -> Result<ServiceInstance, ProtocolError> {
    Ok(ServiceInstance {
        service_type: parse_service_type(element.required_attr("service_type")?)?,
        available: bool_attr(element, "available", true)?,
        protocol_binding: required_text(element, "Protocol_Binding")?,
        address: required_text(element, "Address")?,
        message_bindings: element.children_text("Message_Binding"),
        content_bindings: content_bindings(element),
        message: element.child_text("Message"),
    })
}

fn parse_poll_request(root: &Element) -> Result<PollRequest, ProtocolError> {
    let mut request = PollRequest::new(message_id(root)?, root.required_attr("feed_name")?);
    request.subscription_id = root.attr("subscription_id").map(str::to_string);
    request.exclusive_begin_timestamp = datetime_child(root, "Exclusive_Begin_Timestamp")?;
    request.inclusive_end_timestamp = datetime_child(root, "Inclusive_End_Timestamp")?;
    request.content_bindings = content_bindings(root);
    Ok(request)
}

fn parse_poll_response(root: &Element) -> Result<PollResponse, ProtocolError> {
    Ok(PollResponse {
        message_id: message_id(root)?,
        in_response_to: in_response_to(root)?,
        collection_name: root.required_attr("feed_name")?.to_string(),
        subscription_id: root.attr("subscription_id").map(str::to_string),
        begin_timestamp: datetime_child(root, "Inclusive_Begin_Timestamp")?,
        inclusive_end_timestamp: datetime_child(root, "Inclusive_End_Timestamp")?.ok_or_else(
            || ProtocolError::bad_message("Poll_Response requires Inclusive_End_Timestamp"),
        )?,
        more: false,
        result_id: None,
        result_part_number: 1,
        record_count: None,
        message: root.child_text("Message"),
        content_blocks: root
            .children_named("Content_Block")
            .map(parse_content_block)
            .collect::<Result<_, _>>()?,
    })
}

fn parse_feed(element: &Element) -> Result<CollectionInformation, ProtocolError> {
    let polling_services = element
        .children_named("Polling_Service")
        .map(|e| {
            Ok(ServiceEndpoint {
                protocol_binding: required_text(e, "Protocol_Binding")?,
                address: required_text(e, "Address")?,
                message_bindings: e.children_text("Message_Binding"),
                content_bindings: Vec::new(),
            })
        })
        .collect::<Result<_, ProtocolError>>()?;

    Ok(CollectionInformation {
        name: element.required_attr("feed_name")?.to_string(),
        collection_type: CollectionType::DataFeed,
        available: bool_attr(element, "available", true)?,
        description: element.child_text("Description").unwrap_or_default(),
        volume: None,
        content_bindings: content_bindings(element),
        polling_services,
        receiving_inboxes: Vec::new(),
    })
}

/// Flattens structured details into the 1.0 free-text form.
fn detail_text(details: &[StatusDetail]) -> String {
    details
        .iter()
        .map(|d| {
            if d.name.is_empty() {
                d.values.join(", ")
            } else {
                format!("{}: {}", d.name, d.values.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn q(name: &str) -> String {
    format!("{PREFIX}:{name}")
}

struct Out<'a> {
    w: &'a mut XmlWriter,
}

impl Out<'_> {
    fn root(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let mut all = vec![("xmlns:taxii", NAMESPACE)];
        all.extend_from_slice(attributes);
        self.w.start(&q(name), &all)
    }

    fn end(&mut self, name: &str) -> Result<(), XmlError> {
        self.w.end(&q(name))
    }

    fn text(&mut self, name: &str, text: &str) -> Result<(), XmlError> {
        self.w.text_element(&q(name), &[], text)
    }

    fn optional_text(&mut self, name: &str, text: Option<&str>) -> Result<(), XmlError> {
        self.w.optional_text_element(&q(name), text)
    }

    fn content_bindings(&mut self, bindings: &[ContentBinding]) -> Result<(), XmlError> {
        for binding in bindings {
            self.text("Content_Binding", &binding.binding)?;
        }
        Ok(())
    }

    fn content_block(&mut self, block: &ContentBlock) -> Result<(), XmlError> {
        self.w.start(&q("Content_Block"), &[])?;
        self.text("Content_Binding", &block.content_binding.binding)?;
        self.w.content_element(&q("Content"), &block.content)?;
        if let Some(ts) = &block.timestamp_label {
            self.text("Timestamp_Label", &format_datetime(ts))?;
        }
        self.optional_text("Padding", block.padding.as_deref())?;
        self.end("Content_Block")
    }

    fn discovery_request(&mut self, m: &DiscoveryRequest) -> Result<(), XmlError> {
        self.root("Discovery_Request", &[("message_id", m.message_id.as_str())])?;
        self.end("Discovery_Request")
    }

    fn discovery_response(&mut self, m: &DiscoveryResponse) -> Result<(), XmlError> {
        self.root(
            "Discovery_Response",
            &[
                ("message_id", m.message_id.as_str()),
                ("in_response_to", m.in_response_to.as_str()),
            ],
        )?;
        for instance in &m.service_instances {
            self.w.start(
                &q("Service_Instance"),
                &[
                    ("service_type", service_type_name(instance.service_type)),
                    ("service_version", ProtocolVersion::V10.services()),
                    ("available", format_bool(instance.available)),
                ],
            )?;
            self.text("Protocol_Binding", &instance.protocol_binding)?;
            self.text("Address", &instance.address)?;
            for binding in &instance.message_bindings {
                self.text("Message_Binding", binding)?;
            }
            self.content_bindings(&instance.content_bindings)?;
            self.optional_text("Message", instance.message.as_deref())?;
            self.end("Service_Instance")?;
        }
        self.end("Discovery_Response")
    }

    fn inbox_message(&mut self, m: &InboxMessage) -> Result<(), XmlError> {
        self.root("Inbox_Message", &[("message_id", m.message_id.as_str())])?;
        self.optional_text("Message", m.message.as_deref())?;
        for block in &m.content_blocks {
            self.content_block(block)?;
        }
        self.end("Inbox_Message")
    }

    fn poll_request(&mut self, m: &PollRequest) -> Result<(), XmlError> {
        let mut attrs = vec![
            ("message_id", m.message_id.as_str()),
            ("feed_name", m.collection_name.as_str()),
        ];
        if let Some(id) = &m.subscription_id {
            attrs.push(("subscription_id", id.as_str()));
        }
        self.root("Poll_Request", &attrs)?;
        if let Some(ts) = &m.exclusive_begin_timestamp {
            self.text("Exclusive_Begin_Timestamp", &format_datetime(ts))?;
        }
        if let Some(ts) = &m.inclusive_end_timestamp {
            self.text("Inclusive_End_Timestamp", &format_datetime(ts))?;
        }
        self.content_bindings(&m.content_bindings)?;
        self.end("Poll_Request")
    }

    fn poll_response(&mut self, m: &PollResponse) -> Result<(), XmlError> {
        let mut attrs = vec![
            ("message_id", m.message_id.as_str()),
            ("in_response_to", m.in_response_to.as_str()),
            ("feed_name", m.collection_name.as_str()),
        ];
        if let Some(id) = &m.subscription_id {
            attrs.push(("subscription_id", id.as_str()));
        }
        self.root("Poll_Response", &attrs)?;
        if let Some(ts) = &m.begin_timestamp {
            self.text("Inclusive_Begin_Timestamp", &format_datetime(ts))?;
        }
        self.text(
            "Inclusive_End_Timestamp",
            &format_datetime(&m.inclusive_end_timestamp),
        )?;
        self.optional_text("Message", m.message.as_deref())?;
        for block in &m.content_blocks {
            self.content_block(block)?;
        }
        self.end("Poll_Response")
    }

    fn feed_request(&mut self, m: &CollectionInformationRequest) -> Result<(), XmlError> {
        self.root(
            "Feed_Information_Request",
            &[("message_id", m.message_id.as_str())],
        )?;
        self.end("Feed_Information_Request")
    }

    fn feed_response(&mut self, m: &CollectionInformationResponse) -> Result<(), XmlError> {
        self.root(
            "Feed_Information_Response",
            &[
                ("message_id", m.message_id.as_str()),
                ("in_response_to", m.in_response_to.as_str()),
            ],
        )?;
        for feed in &m.collections {
            self.w.start(
                &q("Feed"),
                &[
                    ("feed_name", feed.name.as_str()),
                    ("available", format_bool(feed.available)),
                ],
            )?;
            self.text("Description", &feed.description)?;
            self.content_bindings(&feed.content_bindings)?;
            for service in &feed.polling_services {
                self.w.start(&q("Polling_Service"), &[])?;
                self.text("Protocol_Binding", &service.protocol_binding)?;
                self.text("Address", &service.address)?;
                for binding in &service.message_bindings {
                    self.text("Message_Binding", binding)?;
                }
                self.end("Polling_Service")?;
            }
            self.end("Feed")?;
        }
        self.end("Feed_Information_Response")
    }

    fn status_message(&mut self, m: &StatusMessage, status: StatusType) -> Result<(), XmlError> {
        self.root(
            "Status_Message",
            &[
                ("message_id", m.message_id.as_str()),
                ("in_response_to", m.in_response_to.as_str()),
                ("status_type", status.as_str()),
            ],
        )?;
        if !m.details.is_empty() {
            self.text("Status_Detail", &detail_text(&m.details))?;
        }
        self.optional_text("Message", m.message.as_deref())?;
        self.end("Status_Message")
    }
}

const ID: AttributeRule = AttributeRule::required("message_id", ValueType::String);
const IN_RESPONSE_TO: AttributeRule = AttributeRule::required("in_response_to", ValueType::String);
const EXTENDED_HEADERS: ChildRule = ChildRule::optional("Extended_Headers");

const fn text(name: &'static str, value: ValueType) -> ElementRule {
    ElementRule {
        name,
        attributes: &[],
        content: ContentModel::Text(value),
    }
}

const fn any(name: &'static str) -> ElementRule {
    ElementRule {
        name,
        attributes: &[],
        content: ContentModel::Any,
    }
}

static SCHEMA: Schema = Schema {
    namespace: NAMESPACE,
    roots: &[
        "Discovery_Request",
        "Discovery_Response",
        "Inbox_Message",
        "Poll_Request",
        "Poll_Response",
        "Feed_Information_Request",
        "Feed_Information_Response",
        "Status_Message",
    ],
    elements: &[
        ElementRule {
            name: "Discovery_Request",
            attributes: &[ID],
            content: ContentModel::Children(&[EXTENDED_HEADERS]),
        },
        ElementRule {
            name: "Discovery_Response",
            attributes: &[ID, IN_RESPONSE_TO],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::many("Service_Instance"),
            ]),
        },
        ElementRule {
            name: "Service_Instance",
            attributes: &[
                AttributeRule::required("service_type", ValueType::Enum(SERVICE_TYPES)),
                AttributeRule::required("service_version", ValueType::AnyUri),
                AttributeRule::optional("available", ValueType::Boolean),
            ],
            content: ContentModel::Children(&[
                ChildRule::one("Protocol_Binding"),
                ChildRule::one("Address"),
                ChildRule::at_least_one("Message_Binding"),
                ChildRule::many("Content_Binding"),
                ChildRule::optional("Message"),
            ]),
        },
        ElementRule {
            name: "Inbox_Message",
            attributes: &[ID],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Message"),
                ChildRule::optional("Source_Subscription"),
                ChildRule::many("Content_Block"),
            ]),
        },
        ElementRule {
            name: "Content_Block",
            attributes: &[],
            content: ContentModel::Children(&[
                ChildRule::one("Content_Binding"),
                ChildRule::one("Content"),
                ChildRule::optional("Timestamp_Label"),
                ChildRule::optional("Padding"),
            ]),
        },
        ElementRule {
            name: "Poll_Request",
            attributes: &[
                ID,
                AttributeRule::required("feed_name", ValueType::String),
                AttributeRule::optional("subscription_id", ValueType::String),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Exclusive_Begin_Timestamp"),
                ChildRule::optional("Inclusive_End_Timestamp"),
                ChildRule::many("Content_Binding"),
            ]),
        },
        ElementRule {
            name: "Poll_Response",
            attributes: &[
                ID,
                IN_RESPONSE_TO,
                AttributeRule::required("feed_name", ValueType::String),
                AttributeRule::optional("subscription_id", ValueType::String),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Inclusive_Begin_Timestamp"),
                ChildRule::one("Inclusive_End_Timestamp"),
                ChildRule::optional("Message"),
                ChildRule::many("Content_Block"),
            ]),
        },
        ElementRule {
            name: "Feed_Information_Request",
            attributes: &[ID],
            content: ContentModel::Children(&[EXTENDED_HEADERS]),
        },
        ElementRule {
            name: "Feed_Information_Response",
            attributes: &[ID, IN_RESPONSE_TO],
            content: ContentModel::Children(&[EXTENDED_HEADERS, ChildRule::many("Feed")]),
        },
        ElementRule {
            name: "Feed",
            attributes: &[
                AttributeRule::required("feed_name", ValueType::String),
                AttributeRule::optional("available", ValueType::Boolean),
            ],
            content: ContentModel::Children(&[
                ChildRule::one("Description"),
                ChildRule::many("Content_Binding"),
                ChildRule::many("Polling_Service"),
                ChildRule::many("Subscription_Service"),
            ]),
        },
        ElementRule {
            name: "Polling_Service",
            attributes: &[],
            content: ContentModel::Children(&[
                ChildRule::one("Protocol_Binding"),
                ChildRule::one("Address"),
                ChildRule::at_least_one("Message_Binding"),
            ]),
        },
        ElementRule {
            name: "Status_Message",
            attributes: &[
                ID,
                IN_RESPONSE_TO,
                AttributeRule::required("status_type", ValueType::Enum(STATUS_TYPES)),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Status_Detail"),
                ChildRule::optional("Message"),
            ]),
        },
        text("Status_Detail", ValueType::String),
        text("Content_Binding", ValueType::AnyUri),
        text("Protocol_Binding", ValueType::AnyUri),
        text("Address", ValueType::String),
        text("Message_Binding", ValueType::AnyUri),
        text("Message", ValueType::String),
        text("Timestamp_Label", ValueType::DateTime),
        text("Padding", ValueType::String),
        text("Exclusive_Begin_Timestamp", ValueType::DateTime),
        text("Inclusive_Begin_Timestamp", ValueType::DateTime),
        text("Inclusive_End_Timestamp", ValueType::DateTime),
        text("Description", ValueType::String),
        any("Content"),
        any("Extended_Headers"),
        any("Source_Subscription"),
        any("Subscription_Service"),
    ],
};
