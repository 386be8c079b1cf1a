//! TAXII 1.1 XML message binding.

use crate::binding::ContentBinding;
use crate::common::{
    content_text, in_response_to, message_id, parse_u64, status_type, unexpected_root,
    unknown_value,
};
use crate::error::{ProtocolError, XmlError};
use crate::message::*;
use crate::schema::{AttributeRule, ChildRule, ContentModel, ElementRule, Schema, ValueType};
use crate::status::StatusType;
use crate::version::{BindingSemantics, ProtocolVersion, VersionAdapter};
use crate::xml::{bool_attr, datetime_child, format_bool, format_datetime, Element, XmlWriter};

/// Namespace of the TAXII 1.1 XML message binding.
pub const NAMESPACE: &str = "http://taxii.mitre.org/messages/taxii_xml_binding-1.1";
const PREFIX: &str = "taxii_11";

const SERVICE_TYPES: &[&str] = &[
    "INBOX",
    "POLL",
    "DISCOVERY",
    "COLLECTION_MANAGEMENT",
    "SUBSCRIPTION_MANAGEMENT",
];

/// Adapter for TAXII 1.1.
pub struct Taxii11;

impl VersionAdapter for Taxii11 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V11
    }

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn prefix(&self) -> &'static str {
        PREFIX
    }

    fn binding_semantics(&self) -> BindingSemantics {
        BindingSemantics::IdentifierAndSubtype
    }

    fn status_type(&self, status: StatusType) -> StatusType {
        status
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
            "Inbox_Message" => Message::InboxMessage(parse_inbox(root)?),
            "Poll_Request" => Message::PollRequest(parse_poll_request(root)?),
            "Poll_Response" => Message::PollResponse(parse_poll_response(root)?),
            "Collection_Information_Request" => {
                Message::CollectionInformationRequest(CollectionInformationRequest {
                    message_id: message_id(root)?,
                })
            }
            "Collection_Information_Response" => {
                Message::CollectionInformationResponse(CollectionInformationResponse {
                    message_id: message_id(root)?,
                    in_response_to: in_response_to(root)?,
                    collections: root
                        .children_named("Collection")
                        .map(parse_collection)
                        .collect::<Result<_, _>>()?,
                })
            }
            "Status_Message" => Message::StatusMessage(parse_status(root)?),
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
            Message::PollRequest(m) => out.poll_request(m)?,
            Message::PollResponse(m) => out.poll_response(m)?,
            Message::CollectionInformationRequest(m) => out.collection_request(m)?,
            Message::CollectionInformationResponse(m) => out.collection_response(m)?,
            Message::StatusMessage(m) => out.status_message(m)?,
        }
        Ok(())
    }
}

fn service_type_name(service_type: ServiceType) -> &'static str {
    match service_type {
        ServiceType::Inbox => "INBOX",
        ServiceType::Poll => "POLL",
        ServiceType::Discovery => "DISCOVERY",
        ServiceType::CollectionManagement => "COLLECTION_MANAGEMENT",
    }
}

fn parse_service_type(value: &str) -> Result<ServiceType, ProtocolError> {
    match value {
        "INBOX" => Ok(ServiceType::Inbox),
        "POLL" => Ok(ServiceType::Poll),
        "DISCOVERY" => Ok(ServiceType::Discovery),
        "COLLECTION_MANAGEMENT" => Ok(ServiceType::CollectionManagement),
        other => Err(unknown_value("Service_Instance", other)),
    }
}

fn parse_content_binding(element: &Element) -> Result<ContentBinding, ProtocolError> {
    let binding = element.required_attr("binding_id")?;
    let subtypes = element
        .children_named("Subtype")
        .map(|s| s.required_attr("subtype_id").map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ContentBinding::with_subtypes(binding, subtypes))
}

fn parse_content_bindings(element: &Element) -> Result<Vec<ContentBinding>, ProtocolError> {
    element
        .children_named("Content_Binding")
        .map(parse_content_binding)
        .collect()
}

fn parse_content_block(element: &Element) -> Result<ContentBlock, ProtocolError> {
    Ok(ContentBlock {
        content_binding: parse_content_binding(element.required_child("Content_Binding")?)?,
        content: content_text(element.required_child("Content")?)?,
        timestamp_label: datetime_child(element, "Timestamp_Label")?,
        message: element.child_text("Message"),
        padding: element.child_text("Padding"),
    })
}

fn parse_content_blocks(element: &Element) -> Result<Vec<ContentBlock>, ProtocolError> {
    element
        .children_named("Content_Block")
        .map(parse_content_block)
        .collect()
}

fn parse_record_count(element: Option<&Element>) -> Result<Option<RecordCount>, ProtocolError> {
    element
        .map(|e| {
            Ok(RecordCount {
                count: parse_u64(e)?,
                partial: bool_attr(e, "partial_count", false)?,
            })
        })
        .transpose()
}

fn required_text(element: &Element, name: &str) -> Result<String, ProtocolError> {
    element.required_child(name).map(Element::text)
}

fn parse_service_instance(element: &Element) -> Result<ServiceInstance, ProtocolError> {
    Ok(ServiceInstance {
        service_type: parse_service_type(element.required_attr("service_type")?)?,
        available: bool_attr(element, "available", true)?,
        protocol_binding: required_text(element, "Protocol_Binding")?,
        address: required_text(element, "Address")?,
        message_bindings: element.children_text("Message_Binding"),
        content_bindings: parse_content_bindings(element)?,
        message: element.child_text("Message"),
    })
}

fn parse_endpoint(element: &Element) -> Result<ServiceEndpoint, ProtocolError> {
    Ok(ServiceEndpoint {
        protocol_binding: required_text(element, "Protocol_Binding")?,
        address: required_text(element, "Address")?,
        message_bindings: element.children_text("Message_Binding"),
        content_bindings: parse_content_bindings(element)?,
    })
}

fn parse_collection(element: &Element) -> Result<CollectionInformation, ProtocolError> {
    let collection_type = match element.attr("collection_type") {
        None | Some("DATA_FEED") => CollectionType::DataFeed,
        Some("DATA_SET") => CollectionType::DataSet,
        Some(other) => return Err(unknown_value("Collection", other)),
    };
    Ok(CollectionInformation {
        name: element.required_attr("collection_name")?.to_string(),
        collection_type,
        available: bool_attr(element, "available", true)?,
        description: element.child_text("Description").unwrap_or_default(),
        volume: element
            .child("Collection_Volume")
            .map(parse_u64)
            .transpose()?,
        content_bindings: parse_content_bindings(element)?,
        polling_services: element
            .children_named("Polling_Service")
            .map(parse_endpoint)
            .collect::<Result<_, _>>()?,
        receiving_inboxes: element
            .children_named("Receiving_Inbox_Service")
            .map(parse_endpoint)
            .collect::<Result<_, _>>()?,
    })
}

fn parse_inbox(root: &Element) -> Result<InboxMessage, ProtocolError> {
    Ok(InboxMessage {
        message_id: message_id(root)?,
        message: root.child_text("Message"),
        destination_collection_names: root.children_text("Destination_Collection_Name"),
        record_count: parse_record_count(root.child("Record_Count"))?,
        content_blocks: parse_content_blocks(root)?,
    })
}

fn parse_poll_request(root: &Element) -> Result<PollRequest, ProtocolError> {
    let mut request = PollRequest::new(message_id(root)?, root.required_attr("collection_name")?);
    request.exclusive_begin_timestamp = datetime_child(root, "Exclusive_Begin_Timestamp")?;
    request.inclusive_end_timestamp = datetime_child(root, "Inclusive_End_Timestamp")?;
    request.subscription_id = root.child_text("Subscription_ID");

    match root.child("Poll_Parameters") {
        Some(_) if request.subscription_id.is_some() => {
            return Err(ProtocolError::bad_message(
                "Poll_Request allows only one of Subscription_ID and Poll_Parameters",
            ));
        }
        Some(params) => {
            request.allow_asynch = bool_attr(params, "allow_asynch", false)?;
            request.response_type = match params.child_text("Response_Type").as_deref() {
                None | Some("FULL") => ResponseType::Full,
                Some("COUNT_ONLY") => ResponseType::CountOnly,
                Some(other) => return Err(unknown_value("Response_Type", other)),
            };
            request.content_bindings = parse_content_bindings(params)?;
        }
        None if request.subscription_id.is_none() => {
            return Err(ProtocolError::bad_message(
                "Poll_Request requires either Subscription_ID or Poll_Parameters",
            ));
        }
        None => {}
    }
    Ok(request)
}

fn parse_poll_response(root: &Element) -> Result<PollResponse, ProtocolError> {
    let result_part_number = match root.attr("result_part_number") {
        None => 1,
        Some(value) => value.trim().parse().map_err(|_| {
            ProtocolError::bad_message(format!(
                "Element 'Poll_Response': '{value}' is not a valid result_part_number"
            ))
        })?,
    };
    Ok(PollResponse {
        message_id: message_id(root)?,
        in_response_to: in_response_to(root)?,
        collection_name: root.required_attr("collection_name")?.to_string(),
        subscription_id: root.child_text("Subscription_ID"),
        begin_timestamp: datetime_child(root, "Exclusive_Begin_Timestamp")?,
        inclusive_end_timestamp: datetime_child(root, "Inclusive_End_Timestamp")?.ok_or_else(
            || ProtocolError::bad_message("Poll_Response requires Inclusive_End_Timestamp"),
        )?,
        more: bool_attr(root, "more", false)?,
        result_id: root.attr("result_id").map(str::to_string),
        result_part_number,
        record_count: parse_record_count(root.child("Record_Count"))?,
        message: root.child_text("Message"),
        content_blocks: parse_content_blocks(root)?,
    })
}

fn parse_status(root: &Element) -> Result<StatusMessage, ProtocolError> {
    let mut details = Vec::new();
    if let Some(status_detail) = root.child("Status_Detail") {
        for detail in status_detail.children_named("Detail") {
            details.push(StatusDetail {
                name: detail.required_attr("name")?.to_string(),
                values: detail.children_text("Value"),
            });
        }
    }
    Ok(StatusMessage {
        message_id: message_id(root)?,
        in_response_to: in_response_to(root)?,
        status_type: status_type(root)?,
        details,
        message: root.child_text("Message"),
    })
}

fn q(name: &str) -> String {
    format!("{PREFIX}:{name}")
}

struct Out<'a> {
    w: &'a mut XmlWriter,
}

impl Out<'_> {
    fn root(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let mut all = vec![("xmlns:taxii_11", NAMESPACE)];
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

    fn content_binding(&mut self, binding: &ContentBinding) -> Result<(), XmlError> {
        let attrs = [("binding_id", binding.binding.as_str())];
        if binding.subtypes.is_empty() {
            return self.w.empty(&q("Content_Binding"), &attrs);
        }
        self.w.start(&q("Content_Binding"), &attrs)?;
        for subtype in &binding.subtypes {
            self.w.empty(&q("Subtype"), &[("subtype_id", subtype.as_str())])?;
        }
        self.end("Content_Binding")
    }

    fn content_block(&mut self, block: &ContentBlock) -> Result<(), XmlError> {
        self.w.start(&q("Content_Block"), &[])?;
        self.content_binding(&block.content_binding)?;
        self.w.content_element(&q("Content"), &block.content)?;
        if let Some(ts) = &block.timestamp_label {
            self.text("Timestamp_Label", &format_datetime(ts))?;
        }
        self.optional_text("Message", block.message.as_deref())?;
        self.optional_text("Padding", block.padding.as_deref())?;
        self.end("Content_Block")
    }

    fn record_count(&mut self, count: &RecordCount) -> Result<(), XmlError> {
        self.w.text_element(
            &q("Record_Count"),
            &[("partial_count", format_bool(count.partial))],
            &count.count.to_string(),
        )
    }

    fn endpoint(&mut self, name: &str, endpoint: &ServiceEndpoint) -> Result<(), XmlError> {
        self.w.start(&q(name), &[])?;
        self.text("Protocol_Binding", &endpoint.protocol_binding)?;
        self.text("Address", &endpoint.address)?;
        for binding in &endpoint.message_bindings {
            self.text("Message_Binding", binding)?;
        }
        for binding in &endpoint.content_bindings {
            self.content_binding(binding)?;
        }
        self.end(name)
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
                    ("service_version", ProtocolVersion::V11.services()),
                    ("available", format_bool(instance.available)),
                ],
            )?;
            self.text("Protocol_Binding", &instance.protocol_binding)?;
            self.text("Address", &instance.address)?;
            for binding in &instance.message_bindings {
                self.text("Message_Binding", binding)?;
            }
            for binding in &instance.content_bindings {
                self.content_binding(binding)?;
            }
            self.optional_text("Message", instance.message.as_deref())?;
            self.end("Service_Instance")?;
        }
        self.end("Discovery_Response")
    }

    fn inbox_message(&mut self, m: &InboxMessage) -> Result<(), XmlError> {
        self.root("Inbox_Message", &[("message_id", m.message_id.as_str())])?;
        self.optional_text("Message", m.message.as_deref())?;
        for name in &m.destination_collection_names {
            self.text("Destination_Collection_Name", name)?;
        }
        if let Some(count) = &m.record_count {
            self.record_count(count)?;
        }
        for block in &m.content_blocks {
            self.content_block(block)?;
        }
        self.end("Inbox_Message")
    }

    fn poll_request(&mut self, m: &PollRequest) -> Result<(), XmlError> {
        self.root(
            "Poll_Request",
            &[
                ("message_id", m.message_id.as_str()),
                ("collection_name", m.collection_name.as_str()),
            ],
        )?;
        if let Some(ts) = &m.exclusive_begin_timestamp {
            self.text("Exclusive_Begin_Timestamp", &format_datetime(ts))?;
        }
        if let Some(ts) = &m.inclusive_end_timestamp {
            self.text("Inclusive_End_Timestamp", &format_datetime(ts))?;
        }
        match &m.subscription_id {
            Some(id) => self.text("Subscription_ID", id)?,
            None => {
                self.w.start(
                    &q("Poll_Parameters"),
                    &[("allow_asynch", format_bool(m.allow_asynch))],
                )?;
                self.text("Response_Type", m.response_type.as_str())?;
                for binding in &m.content_bindings {
                    self.content_binding(binding)?;
                }
                self.end("Poll_Parameters")?;
            }
        }
        self.end("Poll_Request")
    }

    fn poll_response(&mut self, m: &PollResponse) -> Result<(), XmlError> {
        let part = m.result_part_number.to_string();
        let mut attrs = vec![
            ("message_id", m.message_id.as_str()),
            ("in_response_to", m.in_response_to.as_str()),
            ("collection_name", m.collection_name.as_str()),
            ("more", format_bool(m.more)),
        ];
        if let Some(result_id) = &m.result_id {
            attrs.push(("result_id", result_id.as_str()));
        }
        attrs.push(("result_part_number", part.as_str()));

        self.root("Poll_Response", &attrs)?;
        self.optional_text("Subscription_ID", m.subscription_id.as_deref())?;
        if let Some(ts) = &m.begin_timestamp {
            self.text("Exclusive_Begin_Timestamp", &format_datetime(ts))?;
        }
        self.text(
            "Inclusive_End_Timestamp",
            &format_datetime(&m.inclusive_end_timestamp),
        )?;
        if let Some(count) = &m.record_count {
            self.record_count(count)?;
        }
        self.optional_text("Message", m.message.as_deref())?;
        for block in &m.content_blocks {
            self.content_block(block)?;
        }
        self.end("Poll_Response")
    }

    fn collection_request(&mut self, m: &CollectionInformationRequest) -> Result<(), XmlError> {
        self.root(
            "Collection_Information_Request",
            &[("message_id", m.message_id.as_str())],
        )?;
        self.end("Collection_Information_Request")
    }

    fn collection_response(&mut self, m: &CollectionInformationResponse) -> Result<(), XmlError> {
        self.root(
            "Collection_Information_Response",
            &[
                ("message_id", m.message_id.as_str()),
                ("in_response_to", m.in_response_to.as_str()),
            ],
        )?;
        for collection in &m.collections {
            self.w.start(
                &q("Collection"),
                &[
                    ("collection_name", collection.name.as_str()),
                    ("collection_type", collection.collection_type.as_str()),
                    ("available", format_bool(collection.available)),
                ],
            )?;
            self.text("Description", &collection.description)?;
            if let Some(volume) = collection.volume {
                self.text("Collection_Volume", &volume.to_string())?;
            }
            for binding in &collection.content_bindings {
                self.content_binding(binding)?;
            }
            for service in &collection.polling_services {
                self.endpoint("Polling_Service", service)?;
            }
            for inbox in &collection.receiving_inboxes {
                self.endpoint("Receiving_Inbox_Service", inbox)?;
            }
            self.end("Collection")?;
        }
        self.end("Collection_Information_Response")
    }

    fn status_message(&mut self, m: &StatusMessage) -> Result<(), XmlError> {
        self.root(
            "Status_Message",
            &[
                ("message_id", m.message_id.as_str()),
                ("in_response_to", m.in_response_to.as_str()),
                ("status_type", m.status_type.as_str()),
            ],
        )?;
        if !m.details.is_empty() {
            self.w.start(&q("Status_Detail"), &[])?;
            for detail in &m.details {
                self.w.start(&q("Detail"), &[("name", detail.name.as_str())])?;
                for value in &detail.values {
                    self.text("Value", value)?;
                }
                self.end("Detail")?;
            }
            self.end("Status_Detail")?;
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
        "Collection_Information_Request",
        "Collection_Information_Response",
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
            attributes: &[
                ID,
                AttributeRule::optional("result_id", ValueType::String),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Message"),
                ChildRule::many("Destination_Collection_Name"),
                ChildRule::optional("Source_Subscription"),
                ChildRule::optional("Record_Count"),
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
                ChildRule::optional("Message"),
                ChildRule::optional("Padding"),
            ]),
        },
        ElementRule {
            name: "Content_Binding",
            attributes: &[AttributeRule::required("binding_id", ValueType::AnyUri)],
            content: ContentModel::Children(&[ChildRule::many("Subtype")]),
        },
        ElementRule {
            name: "Subtype",
            attributes: &[AttributeRule::required("subtype_id", ValueType::AnyUri)],
            content: ContentModel::Empty,
        },
        ElementRule {
            name: "Record_Count",
            attributes: &[AttributeRule::optional("partial_count", ValueType::Boolean)],
            content: ContentModel::Text(ValueType::Integer),
        },
        ElementRule {
            name: "Poll_Request",
            attributes: &[
                ID,
                AttributeRule::required("collection_name", ValueType::String),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Exclusive_Begin_Timestamp"),
                ChildRule::optional("Inclusive_End_Timestamp"),
                ChildRule::choice("Subscription_ID", "poll_source"),
                ChildRule::choice("Poll_Parameters", "poll_source"),
            ]),
        },
        ElementRule {
            name: "Poll_Parameters",
            attributes: &[AttributeRule::optional("allow_asynch", ValueType::Boolean)],
            content: ContentModel::Children(&[
                ChildRule::optional("Response_Type"),
                ChildRule::many("Content_Binding"),
                ChildRule::optional("Query"),
                ChildRule::optional("Delivery_Parameters"),
            ]),
        },
        text(
            "Response_Type",
            ValueType::Enum(&["FULL", "COUNT_ONLY"]),
        ),
        ElementRule {
            name: "Poll_Response",
            attributes: &[
                ID,
                IN_RESPONSE_TO,
                AttributeRule::required("collection_name", ValueType::String),
                AttributeRule::optional("more", ValueType::Boolean),
                AttributeRule::optional("result_id", ValueType::String),
                AttributeRule::optional("result_part_number", ValueType::Integer),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Subscription_ID"),
                ChildRule::optional("Exclusive_Begin_Timestamp"),
                ChildRule::one("Inclusive_End_Timestamp"),
                ChildRule::optional("Record_Count"),
                ChildRule::optional("Message"),
                ChildRule::many("Content_Block"),
            ]),
        },
        ElementRule {
            name: "Collection_Information_Request",
            attributes: &[ID],
            content: ContentModel::Children(&[EXTENDED_HEADERS]),
        },
        ElementRule {
            name: "Collection_Information_Response",
            attributes: &[ID, IN_RESPONSE_TO],
            content: ContentModel::Children(&[EXTENDED_HEADERS, ChildRule::many("Collection")]),
        },
        ElementRule {
            name: "Collection",
            attributes: &[
                AttributeRule::required("collection_name", ValueType::String),
                AttributeRule::optional(
                    "collection_type",
                    ValueType::Enum(&["DATA_FEED", "DATA_SET"]),
                ),
                AttributeRule::optional("available", ValueType::Boolean),
            ],
            content: ContentModel::Children(&[
                ChildRule::one("Description"),
                ChildRule::optional("Collection_Volume"),
                ChildRule::many("Content_Binding"),
                ChildRule::many("Polling_Service"),
                ChildRule::many("Subscription_Service"),
                ChildRule::many("Receiving_Inbox_Service"),
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
            name: "Receiving_Inbox_Service",
            attributes: &[],
            content: ContentModel::Children(&[
                ChildRule::one("Protocol_Binding"),
                ChildRule::one("Address"),
                ChildRule::at_least_one("Message_Binding"),
                ChildRule::many("Content_Binding"),
            ]),
        },
        ElementRule {
            name: "Status_Message",
            attributes: &[
                ID,
                IN_RESPONSE_TO,
                AttributeRule::required("status_type", ValueType::String),
            ],
            content: ContentModel::Children(&[
                EXTENDED_HEADERS,
                ChildRule::optional("Status_Detail"),
                ChildRule::optional("Message"),
            ]),
        },
        ElementRule {
            name: "Status_Detail",
            attributes: &[],
            content: ContentModel::Children(&[ChildRule::many("Detail")]),
        },
        ElementRule {
            name: "Detail",
            attributes: &[AttributeRule::required("name", ValueType::String)],
            content: ContentModel::Children(&[ChildRule::many("Value")]),
        },
        text("Value", ValueType::String),
        text("Protocol_Binding", ValueType::AnyUri),
        text("Address", ValueType::String),
        text("Message_Binding", ValueType::AnyUri),
        text("Message", ValueType::String),
        text("Destination_Collection_Name", ValueType::String),
        text("Timestamp_Label", ValueType::DateTime),
        text("Padding", ValueType::String),
        text("Exclusive_Begin_Timestamp", ValueType::DateTime),
        text("Inclusive_End_Timestamp", ValueType::DateTime),
        text("Subscription_ID", ValueType::String),
        text("Description", ValueType::String),
        text("Collection_Volume", ValueType::Integer),
        any("Content"),
        any("Extended_Headers"),
        any("Source_Subscription"),
        any("Query"),
        any("Delivery_Parameters"),
        any("Subscription_Service"),
    ],
};
