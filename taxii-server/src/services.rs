//! TAXII service handlers.
//!
//! Each handler serves one [`ServiceType`] and is registered once in a
//! [`HandlerRegistry`] at startup. Handlers return either a response message
//! or a status message; errors they raise are turned into status messages by
//! the dispatcher.

use crate::auth::Account;
use crate::error::ServerError;
use crate::metrics::Metrics;
use chrono::Utc;
use std::collections::HashMap;
use taxii_protocol::{
    generate_message_id, intersect, is_supported, CollectionInformation,
    CollectionInformationResponse, ContentBinding, ContentBlock, DiscoveryResponse, InboxMessage,
    Message, MessageKind, PollRequest, PollResponse, ProtocolVersion, RecordCount, ResponseType,
    ServiceEndpoint, ServiceInstance, ServiceType, StatusMessage, StatusType, VID_TAXII_HTTPS_10,
};
use taxii_storage::{
    CollectionDefinition, ContentBlockEntity, InboxMessageEntity, Persistence, PollQuery,
    ServiceDefinition,
};

/// Status detail listing the content an inbox or collection accepts.
pub const SUPPORTED_CONTENT: &str = "SUPPORTED_CONTENT";
/// Status detail listing the collections an inbox can deliver to.
pub const ACCEPTABLE_DESTINATION: &str = "ACCEPTABLE_DESTINATION";
/// Status detail naming the item that was not found.
pub const ITEM: &str = "ITEM";

/// Everything a handler may look at while serving one request.
pub struct HandlerContext<'a> {
    /// The service the request was addressed to.
    pub service: &'a ServiceDefinition,
    pub version: ProtocolVersion,
    /// The caller, if any credentials were accepted.
    pub account: Option<&'a Account>,
    pub storage: &'a dyn Persistence,
    /// Prefix for relative service addresses.
    pub domain: Option<&'a str>,
    /// Message bindings the server accepts.
    pub message_bindings: &'a [&'static str],
    pub metrics: Option<&'a Metrics>,
}

impl HandlerContext<'_> {
    /// Collection permissions only apply to services that require
    /// authentication.
    pub fn can_read(&self, collection: &str) -> bool {
        !self.service.authentication_required
            || self.account.is_some_and(|a| a.can_read(collection))
    }

    pub fn can_modify(&self, collection: &str) -> bool {
        !self.service.authentication_required
            || self.account.is_some_and(|a| a.can_modify(collection))
    }

    fn message_bindings(&self) -> Vec<String> {
        self.message_bindings.iter().map(|b| b.to_string()).collect()
    }

    /// Endpoints of the given type that serve a collection.
    fn endpoints(
        &self,
        collection: &CollectionDefinition,
        service_type: ServiceType,
    ) -> Vec<ServiceEndpoint> {
        let mut endpoints = Vec::new();
        for id in &collection.service_ids {
            let Some(service) = self.storage.get_service(id) else {
                continue;
            };
            if service.service_type != service_type || !service.available {
                continue;
            }
            for protocol_binding in &service.protocol_bindings {
                endpoints.push(ServiceEndpoint {
                    protocol_binding: protocol_binding.clone(),
                    address: absolute_address(self.domain, &service.address, protocol_binding),
                    message_bindings: self.message_bindings(),
                    content_bindings: if service_type == ServiceType::Inbox {
                        service.supported_content.clone()
                    } else {
                        Vec::new()
                    },
                });
            }
        }
        endpoints
    }
}

/// Builds the address clients should use for a service.
///
/// Relative addresses are prefixed with `domain`. A scheme matching the
/// protocol binding is added when the result has none.
pub fn absolute_address(domain: Option<&str>, address: &str, protocol_binding: &str) -> String {
    let full = match domain {
        Some(domain) if address.starts_with('/') => {
            format!("{}{}", domain.trim_end_matches('/'), address)
        }
        _ => address.to_string(),
    };

    if full.starts_with('/') || full.starts_with("http://") || full.starts_with("https://") {
        full
    } else if protocol_binding == VID_TAXII_HTTPS_10 {
        format!("https://{}", full)
    } else {
        format!("http://{}", full)
    }
}

fn status(in_response_to: &str, status_type: StatusType, message: impl Into<String>) -> Message {
    StatusMessage::new(in_response_to, status_type)
        .with_message(message)
        .into()
}

fn binding_ids(bindings: &[ContentBinding]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for binding in bindings {
        if !ids.contains(&binding.binding) {
            ids.push(binding.binding.clone());
        }
    }
    ids
}

/// A handler for one service type.
pub trait ServiceHandler: Send + Sync {
    fn service_type(&self) -> ServiceType;

    /// Returns whether the handler accepts requests of this kind.
    fn handles(&self, kind: MessageKind) -> bool;

    fn handle(&self, ctx: &HandlerContext<'_>, message: Message) -> Result<Message, ServerError>;
}

/// Handlers keyed by the service type they serve.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ServiceType, Box<dyn ServiceHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a handler for every service type.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DiscoveryHandler));
        registry.register(Box::new(InboxHandler));
        registry.register(Box::new(PollHandler));
        registry.register(Box::new(CollectionManagementHandler));
        registry
    }

    /// Registers a handler, replacing any previous one for its service type.
    pub fn register(&mut self, handler: Box<dyn ServiceHandler>) {
        self.handlers.insert(handler.service_type(), handler);
    }

    /// Finds the handler for a message sent to a service of the given type.
    pub fn route(
        &self,
        service_type: ServiceType,
        kind: MessageKind,
    ) -> Option<&dyn ServiceHandler> {
        self.handlers
            .get(&service_type)
            .map(|h| &**h)
            .filter(|h| h.handles(kind))
    }
}

/// Lists the services a discovery service advertises.
pub struct DiscoveryHandler;

impl ServiceHandler for DiscoveryHandler {
    fn service_type(&self) -> ServiceType {
        ServiceType::Discovery
    }

    fn handles(&self, kind: MessageKind) -> bool {
        kind == MessageKind::DiscoveryRequest
    }

    fn handle(&self, ctx: &HandlerContext<'_>, message: Message) -> Result<Message, ServerError> {
        let kind = message.kind();
        let Message::DiscoveryRequest(request) = message else {
            return Err(ServerError::NotFound(format!(
                "{} is not handled by discovery services",
                kind
            )));
        };

        let advertised = if ctx.service.advertised_services.is_empty() {
            ctx.storage.services()
        } else {
            ctx.service
                .advertised_services
                .iter()
                .filter_map(|id| {
                    let service = ctx.storage.get_service(id);
                    if service.is_none() {
                        tracing::warn!(
                            "Discovery service '{}' advertises unknown service '{}'",
                            ctx.service.id,
                            id
                        );
                    }
                    service
                })
                .collect()
        };

        let mut service_instances = Vec::new();
        for service in &advertised {
            for protocol_binding in &service.protocol_bindings {
                service_instances.push(ServiceInstance {
                    service_type: service.service_type,
                    available: service.available,
                    protocol_binding: protocol_binding.clone(),
                    address: absolute_address(ctx.domain, &service.address, protocol_binding),
                    message_bindings: ctx.message_bindings(),
                    content_bindings: if service.service_type == ServiceType::Inbox {
                        service.supported_content.clone()
                    } else {
                        Vec::new()
                    },
                    message: (!service.description.is_empty())
                        .then(|| service.description.clone()),
                });
            }
        }

        Ok(Message::DiscoveryResponse(DiscoveryResponse {
            message_id: generate_message_id(),
            in_response_to: request.message_id,
            service_instances,
        }))
    }
}

/// Accepts pushed content.
pub struct InboxHandler;

impl InboxHandler {
    /// Resolves where the message's content goes. A status message is
    /// returned when the destinations are unacceptable.
    fn destinations(
        ctx: &HandlerContext<'_>,
        inbox: &InboxMessage,
    ) -> Result<Vec<CollectionDefinition>, Message> {
        if inbox.destination_collection_names.is_empty() {
            if ctx.version == ProtocolVersion::V11 && ctx.service.destination_collection_required {
                return Err(StatusMessage::new(
                    &inbox.message_id,
                    StatusType::DestinationCollectionError,
                )
                .with_message(
                    "A Destination_Collection_Name is required and none were specified",
                )
                .with_detail(ACCEPTABLE_DESTINATION, Self::acceptable(ctx))
                .into());
            }
            return Ok(ctx
                .storage
                .get_collections(&ctx.service.id)
                .into_iter()
                .filter(|c| c.available)
                .collect());
        }

        let mut destinations = Vec::new();
        for name in &inbox.destination_collection_names {
            match ctx.storage.get_collection(name, &ctx.service.id) {
                Some(collection) if collection.available => destinations.push(collection),
                _ => {
                    return Err(StatusMessage::new(
                        &inbox.message_id,
                        StatusType::DestinationCollectionError,
                    )
                    .with_message(format!(
                        "Collection '{}' is not a valid destination for this inbox",
                        name
                    ))
                    .with_detail(ACCEPTABLE_DESTINATION, Self::acceptable(ctx))
                    .into());
                }
            }
        }
        Ok(destinations)
    }

    fn acceptable(ctx: &HandlerContext<'_>) -> Vec<String> {
        ctx.storage
            .get_collections(&ctx.service.id)
            .into_iter()
            .filter(|c| c.available)
            .map(|c| c.name)
            .collect()
    }
}

impl ServiceHandler for InboxHandler {
    fn service_type(&self) -> ServiceType {
        ServiceType::Inbox
    }

    fn handles(&self, kind: MessageKind) -> bool {
        kind == MessageKind::InboxMessage
    }

    fn handle(&self, ctx: &HandlerContext<'_>, message: Message) -> Result<Message, ServerError> {
        let kind = message.kind();
        let Message::InboxMessage(inbox) = message else {
            return Err(ServerError::NotFound(format!(
                "{} is not handled by inbox services",
                kind
            )));
        };

        let destinations = match Self::destinations(ctx, &inbox) {
            Ok(destinations) => destinations,
            Err(status) => return Ok(status),
        };
        for collection in &destinations {
            if !ctx.can_modify(&collection.name) {
                return Err(ServerError::Denied(format!(
                    "no permission to modify collection '{}'",
                    collection.name
                )));
            }
        }

        let supported = ctx.storage.get_supported_bindings(&ctx.service.id)?;
        let now = Utc::now();
        let total = inbox.content_blocks.len();
        let mut rejected = 0;
        let mut accepted = Vec::new();

        for block in inbox.content_blocks {
            if !supported.is_empty()
                && !is_supported(&supported, &block.content_binding, ctx.version)
            {
                tracing::warn!(
                    "Inbox '{}' does not support content binding {}, skipping block",
                    ctx.service.id,
                    block.content_binding
                );
                rejected += 1;
                continue;
            }

            let collections: Vec<String> = destinations
                .iter()
                .filter(|c| {
                    c.supported_content.is_empty()
                        || is_supported(&c.supported_content, &block.content_binding, ctx.version)
                })
                .map(|c| c.name.clone())
                .collect();
            if collections.is_empty() {
                tracing::warn!(
                    "No destination collection of inbox '{}' accepts {}, skipping block",
                    ctx.service.id,
                    block.content_binding
                );
                continue;
            }

            let mut entity = ContentBlockEntity::new(
                block.content_binding,
                block.content,
                block.timestamp_label.unwrap_or(now),
            );
            entity.message = block.message;
            accepted.push((entity, collections));
        }

        if total > 0 && rejected == total {
            return Ok(StatusMessage::new(&inbox.message_id, StatusType::UnsupportedContent)
                .with_message("None of the content bindings are supported by this inbox")
                .with_detail(SUPPORTED_CONTENT, binding_ids(&supported))
                .into());
        }

        let stored = accepted.len();
        let entity = InboxMessageEntity {
            id: 0,
            message_id: inbox.message_id.clone(),
            service_id: ctx.service.id.clone(),
            message: inbox.message,
            received_at: now,
            destination_collections: destinations.into_iter().map(|c| c.name).collect(),
            record_count: inbox.record_count.map(|r| r.count),
            partial_count: inbox.record_count.is_some_and(|r| r.partial),
            content_block_count: stored,
        };
        ctx.storage.save_inbox_message(entity, accepted)?;

        if let Some(metrics) = ctx.metrics {
            metrics.content_blocks_stored_total.inc_by(stored as u64);
        }
        tracing::info!(
            "Inbox '{}' stored {} of {} content blocks from message {}",
            ctx.service.id,
            stored,
            total,
            inbox.message_id
        );

        Ok(StatusMessage::new(&inbox.message_id, StatusType::Success).into())
    }
}

/// Returns stored content of a collection.
pub struct PollHandler;

impl PollHandler {
    /// Drops overlap entries for identifiers whose subtypes were restricted
    /// on both sides but share nothing.
    fn usable_overlap(
        supported: &[ContentBinding],
        requested: &[ContentBinding],
        overlap: Vec<ContentBinding>,
    ) -> Vec<ContentBinding> {
        overlap
            .into_iter()
            .filter(|b| {
                !b.is_wildcard()
                    || supported
                        .iter()
                        .chain(requested)
                        .filter(|x| x.binding == b.binding)
                        .any(ContentBinding::is_wildcard)
            })
            .collect()
    }

    fn respond(
        ctx: &HandlerContext<'_>,
        request: PollRequest,
        collection: &CollectionDefinition,
    ) -> Result<Message, ServerError> {
        let overlap = intersect(&collection.supported_content, &request.content_bindings);
        let overlap = Self::usable_overlap(
            &collection.supported_content,
            &request.content_bindings,
            overlap,
        );
        if !request.content_bindings.is_empty() && overlap.is_empty() {
            return Ok(StatusMessage::new(&request.message_id, StatusType::UnsupportedContent)
                .with_message(format!(
                    "Collection '{}' has no content in the requested bindings",
                    collection.name
                ))
                .with_detail(SUPPORTED_CONTENT, binding_ids(&collection.supported_content))
                .into());
        }

        let query = PollQuery {
            begin: request.exclusive_begin_timestamp,
            end: request.inclusive_end_timestamp,
            bindings: overlap,
            limit: ctx.service.max_result_count,
        };
        let result = ctx.storage.poll_content(&collection.name, &query)?;
        let partial = result.is_partial();
        let total = result.total;

        // 1.0 reports an inclusive begin, so use the earliest block returned.
        let begin_timestamp = match ctx.version {
            ProtocolVersion::V10 => result.blocks.iter().map(|b| b.timestamp_label).min(),
            ProtocolVersion::V11 => request.exclusive_begin_timestamp,
        };

        let content_blocks = match request.response_type {
            ResponseType::CountOnly => Vec::new(),
            ResponseType::Full => result
                .blocks
                .into_iter()
                .map(|block| ContentBlock {
                    content_binding: block.binding,
                    content: block.content,
                    timestamp_label: Some(block.timestamp_label),
                    message: block.message,
                    padding: None,
                })
                .collect(),
        };

        tracing::debug!(
            "Poll of '{}' returned {} of {} blocks",
            collection.name,
            content_blocks.len(),
            total
        );

        Ok(Message::PollResponse(PollResponse {
            message_id: generate_message_id(),
            in_response_to: request.message_id,
            collection_name: collection.name.clone(),
            subscription_id: None,
            begin_timestamp,
            inclusive_end_timestamp: request.inclusive_end_timestamp.unwrap_or_else(Utc::now),
            more: false,
            result_id: None,
            result_part_number: 1,
            record_count: Some(RecordCount {
                count: total as u64,
                partial,
            }),
            message: None,
            content_blocks,
        }))
    }
}

impl ServiceHandler for PollHandler {
    fn service_type(&self) -> ServiceType {
        ServiceType::Poll
    }

    fn handles(&self, kind: MessageKind) -> bool {
        kind == MessageKind::PollRequest
    }

    fn handle(&self, ctx: &HandlerContext<'_>, message: Message) -> Result<Message, ServerError> {
        let kind = message.kind();
        let Message::PollRequest(request) = message else {
            return Err(ServerError::NotFound(format!(
                "{} is not handled by poll services",
                kind
            )));
        };

        if let Some(subscription_id) = &request.subscription_id {
            return Ok(StatusMessage::new(&request.message_id, StatusType::NotFound)
                .with_message("Subscriptions are not supported")
                .with_detail(ITEM, [subscription_id.as_str()])
                .into());
        }

        let Some(collection) = ctx
            .storage
            .get_collection(&request.collection_name, &ctx.service.id)
        else {
            return Ok(StatusMessage::new(&request.message_id, StatusType::NotFound)
                .with_message(format!(
                    "Collection '{}' is not served by this poll service",
                    request.collection_name
                ))
                .with_detail(ITEM, [request.collection_name.as_str()])
                .into());
        };

        if !collection.available {
            return Ok(status(
                &request.message_id,
                StatusType::Failure,
                format!("Collection '{}' is not available", collection.name),
            ));
        }
        if !ctx.can_read(&collection.name) {
            return Err(ServerError::Denied(format!(
                "no permission to read collection '{}'",
                collection.name
            )));
        }

        Self::respond(ctx, request, &collection)
    }
}

/// Describes the collections behind a collection management service.
pub struct CollectionManagementHandler;

impl ServiceHandler for CollectionManagementHandler {
    fn service_type(&self) -> ServiceType {
        ServiceType::CollectionManagement
    }

    fn handles(&self, kind: MessageKind) -> bool {
        kind == MessageKind::CollectionInformationRequest
    }

    fn handle(&self, ctx: &HandlerContext<'_>, message: Message) -> Result<Message, ServerError> {
        let kind = message.kind();
        let Message::CollectionInformationRequest(request) = message else {
            return Err(ServerError::NotFound(format!(
                "{} is not handled by collection management services",
                kind
            )));
        };

        let mut collections = Vec::new();
        for collection in ctx.storage.get_collections(&ctx.service.id) {
            if !ctx.can_read(&collection.name) {
                continue;
            }
            let volume = ctx.storage.content_count(&collection.name)?;
            collections.push(CollectionInformation {
                name: collection.name.clone(),
                collection_type: collection.collection_type,
                available: collection.available,
                description: collection.description.clone(),
                volume: Some(volume),
                content_bindings: collection.supported_content.clone(),
                polling_services: ctx.endpoints(&collection, ServiceType::Poll),
                receiving_inboxes: ctx.endpoints(&collection, ServiceType::Inbox),
            });
        }

        Ok(Message::CollectionInformationResponse(
            CollectionInformationResponse {
                message_id: generate_message_id(),
                in_response_to: request.message_id,
                collections,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Permission;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use taxii_protocol::{
        CollectionInformationRequest, DiscoveryRequest, VID_TAXII_HTTP_10, VID_TAXII_XML_11,
    };
    use taxii_storage::MemoryStore;

    const STIX: &str = "urn:stix.mitre.org:xml:1.1.1";
    const CAP: &str = "urn:oasis:names:tc:emergency:cap:1.2";
    const BINDINGS: &[&str] = &[VID_TAXII_XML_11];

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut inbox = ServiceDefinition::new("inbox-a", ServiceType::Inbox, "/services/inbox");
        inbox.supported_content = vec![
            ContentBinding::with_subtypes(STIX, ["indicators"]),
            ContentBinding::new(CAP),
        ];
        let mut discovery =
            ServiceDefinition::new("discovery-a", ServiceType::Discovery, "/services/discovery");
        discovery.description = "discovery".to_string();
        discovery.advertised_services = vec!["inbox-a".to_string(), "missing".to_string()];
        let poll = ServiceDefinition::new("poll-a", ServiceType::Poll, "/services/poll");
        let mgmt = ServiceDefinition::new(
            "mgmt-a",
            ServiceType::CollectionManagement,
            "/services/collections",
        );
        store
            .create_services_from_object(vec![inbox, discovery, poll, mgmt])
            .unwrap();

        let mut c1 = CollectionDefinition::new("c1").with_services(["inbox-a", "poll-a", "mgmt-a"]);
        c1.supported_content = vec![ContentBinding::new(STIX)];
        store.create_collection(c1).unwrap();
        store
            .create_collection(
                CollectionDefinition::new("c2").with_services(["inbox-a", "poll-a", "mgmt-a"]),
            )
            .unwrap();
        store
    }

    fn ctx<'a>(
        storage: &'a MemoryStore,
        service: &'a ServiceDefinition,
        version: ProtocolVersion,
        account: Option<&'a Account>,
    ) -> HandlerContext<'a> {
        HandlerContext {
            service,
            version,
            account,
            storage,
            domain: Some("taxii.example.com"),
            message_bindings: BINDINGS,
            metrics: None,
        }
    }

    fn inbox_message(blocks: Vec<ContentBlock>) -> InboxMessage {
        InboxMessage {
            message_id: "m1".to_string(),
            message: None,
            destination_collection_names: Vec::new(),
            record_count: None,
            content_blocks: blocks,
        }
    }

    fn stix_block(subtype: &str, content: &str, secs: i64) -> ContentBlock {
        ContentBlock::new(ContentBinding::with_subtypes(STIX, [subtype]), content)
            .with_timestamp_label(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn expect_status(message: Message) -> StatusMessage {
        match message {
            Message::StatusMessage(status) => status,
            other => panic!("expected status message, got {:?}", other.kind()),
        }
    }

    fn poll(storage: &MemoryStore, request: PollRequest) -> Message {
        let service = storage.get_service("poll-a").unwrap();
        PollHandler
            .handle(
                &ctx(storage, &service, ProtocolVersion::V11, None),
                Message::PollRequest(request),
            )
            .unwrap()
    }

    #[test]
    fn test_absolute_address() {
        assert_eq!(
            absolute_address(Some("example.com"), "/inbox", VID_TAXII_HTTP_10),
            "http://example.com/inbox"
        );
        assert_eq!(
            absolute_address(Some("example.com/"), "/inbox", VID_TAXII_HTTPS_10),
            "https://example.com/inbox"
        );
        assert_eq!(
            absolute_address(Some("https://example.com"), "/inbox", VID_TAXII_HTTP_10),
            "https://example.com/inbox"
        );
        assert_eq!(absolute_address(None, "/inbox", VID_TAXII_HTTP_10), "/inbox");
        assert_eq!(
            absolute_address(Some("example.com"), "http://other/inbox", VID_TAXII_HTTP_10),
            "http://other/inbox"
        );
    }

    #[test]
    fn test_registry_routes_by_service_and_kind() {
        let registry = HandlerRegistry::standard();
        assert!(registry
            .route(ServiceType::Inbox, MessageKind::InboxMessage)
            .is_some());
        assert!(registry
            .route(ServiceType::Inbox, MessageKind::PollRequest)
            .is_none());
        assert!(registry
            .route(ServiceType::Discovery, MessageKind::StatusMessage)
            .is_none());
        assert!(HandlerRegistry::new()
            .route(ServiceType::Poll, MessageKind::PollRequest)
            .is_none());
    }

    #[test]
    fn test_discovery_lists_advertised_services() {
        let storage = store();
        let service = storage.get_service("discovery-a").unwrap();
        let response = DiscoveryHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V11, None),
                Message::DiscoveryRequest(DiscoveryRequest {
                    message_id: "42".to_string(),
                }),
            )
            .unwrap();

        let Message::DiscoveryResponse(response) = response else {
            panic!("expected discovery response");
        };
        assert_eq!(response.in_response_to, "42");
        assert_eq!(response.service_instances.len(), 1);
        let instance = &response.service_instances[0];
        assert_eq!(instance.service_type, ServiceType::Inbox);
        assert_eq!(instance.address, "http://taxii.example.com/services/inbox");
        assert_eq!(instance.message_bindings, vec![VID_TAXII_XML_11]);
        assert_eq!(instance.content_bindings.len(), 2);
    }

    #[test]
    fn test_inbox_stores_supported_blocks() {
        let storage = store();
        let service = storage.get_service("inbox-a").unwrap();
        let message = inbox_message(vec![
            stix_block("indicators", "<a/>", 10),
            stix_block("incidents", "<b/>", 11),
        ]);

        let status = expect_status(
            InboxHandler
                .handle(
                    &ctx(&storage, &service, ProtocolVersion::V11, None),
                    Message::InboxMessage(message),
                )
                .unwrap(),
        );
        assert_eq!(status.status_type, StatusType::Success);
        assert_eq!(status.in_response_to, "m1");
        assert_eq!(storage.content_count("c1").unwrap(), 1);
        assert_eq!(storage.content_count("c2").unwrap(), 1);
    }

    #[test]
    fn test_inbox_rejects_all_unsupported() {
        let storage = store();
        let service = storage.get_service("inbox-a").unwrap();
        let message = inbox_message(vec![ContentBlock::new(
            ContentBinding::new("urn:unknown"),
            "x",
        )]);

        let status = expect_status(
            InboxHandler
                .handle(
                    &ctx(&storage, &service, ProtocolVersion::V11, None),
                    Message::InboxMessage(message),
                )
                .unwrap(),
        );
        assert_eq!(status.status_type, StatusType::UnsupportedContent);
        assert_eq!(status.details[0].name, SUPPORTED_CONTENT);
        assert_eq!(status.details[0].values, vec![STIX, CAP]);
        assert_eq!(storage.content_count("c1").unwrap(), 0);
    }

    #[test]
    fn test_inbox_block_goes_only_to_accepting_collections() {
        let storage = store();
        let service = storage.get_service("inbox-a").unwrap();
        let message = inbox_message(vec![ContentBlock::new(ContentBinding::new(CAP), "<alert/>")]);

        InboxHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V10, None),
                Message::InboxMessage(message),
            )
            .unwrap();
        assert_eq!(storage.content_count("c1").unwrap(), 0);
        assert_eq!(storage.content_count("c2").unwrap(), 1);
    }

    #[test]
    fn test_inbox_destination_required() {
        let storage = MemoryStore::new();
        let mut service = ServiceDefinition::new("inbox", ServiceType::Inbox, "/inbox");
        service.destination_collection_required = true;
        storage
            .create_services_from_object(vec![service.clone()])
            .unwrap();
        storage
            .create_collection(CollectionDefinition::new("c1").with_services(["inbox"]))
            .unwrap();

        let status = expect_status(
            InboxHandler
                .handle(
                    &ctx(&storage, &service, ProtocolVersion::V11, None),
                    Message::InboxMessage(inbox_message(Vec::new())),
                )
                .unwrap(),
        );
        assert_eq!(status.status_type, StatusType::DestinationCollectionError);
        assert_eq!(status.details[0].values, vec!["c1"]);

        let mut message = inbox_message(Vec::new());
        message.destination_collection_names = vec!["nope".to_string()];
        let status = expect_status(
            InboxHandler
                .handle(
                    &ctx(&storage, &service, ProtocolVersion::V11, None),
                    Message::InboxMessage(message),
                )
                .unwrap(),
        );
        assert_eq!(status.status_type, StatusType::DestinationCollectionError);

        // 1.0 has no destinations, so the requirement does not apply
        let status = expect_status(
            InboxHandler
                .handle(
                    &ctx(&storage, &service, ProtocolVersion::V10, None),
                    Message::InboxMessage(inbox_message(Vec::new())),
                )
                .unwrap(),
        );
        assert_eq!(status.status_type, StatusType::Success);
    }

    #[test]
    fn test_inbox_requires_modify_permission() {
        let storage = store();
        let mut service = storage.get_service("inbox-a").unwrap();
        service.authentication_required = true;

        let mut permissions = BTreeMap::new();
        permissions.insert("c1".to_string(), Permission::Modify);
        permissions.insert("c2".to_string(), Permission::Read);
        let account = Account {
            username: "analyst".to_string(),
            is_admin: false,
            permissions,
        };

        let err = InboxHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V11, Some(&account)),
                Message::InboxMessage(inbox_message(vec![stix_block("indicators", "x", 1)])),
            )
            .unwrap_err();
        assert_eq!(err.status_type(), StatusType::Denied);
        assert_eq!(storage.content_count("c1").unwrap(), 0);

        let mut message = inbox_message(vec![stix_block("indicators", "x", 1)]);
        message.destination_collection_names = vec!["c1".to_string()];
        let status = expect_status(
            InboxHandler
                .handle(
                    &ctx(&storage, &service, ProtocolVersion::V11, Some(&account)),
                    Message::InboxMessage(message),
                )
                .unwrap(),
        );
        assert_eq!(status.status_type, StatusType::Success);
        assert_eq!(storage.content_count("c1").unwrap(), 1);
    }

    #[test]
    fn test_poll_returns_window() {
        let storage = store();
        for (i, secs) in [10, 20, 30].iter().enumerate() {
            storage
                .save_content(
                    ContentBlockEntity::new(
                        ContentBinding::with_subtypes(STIX, ["indicators"]),
                        format!("block-{i}"),
                        Utc.timestamp_opt(*secs, 0).unwrap(),
                    ),
                    &["c1".to_string()],
                )
                .unwrap();
        }

        let mut request = PollRequest::new("p1", "c1");
        request.exclusive_begin_timestamp = Some(Utc.timestamp_opt(10, 0).unwrap());
        request.inclusive_end_timestamp = Some(Utc.timestamp_opt(30, 0).unwrap());

        let Message::PollResponse(response) = poll(&storage, request) else {
            panic!("expected poll response");
        };
        assert_eq!(response.in_response_to, "p1");
        assert_eq!(response.collection_name, "c1");
        let contents: Vec<&str> = response
            .content_blocks
            .iter()
            .map(|b| b.content.as_str())
            .collect();
        assert_eq!(contents, vec!["block-1", "block-2"]);
        assert_eq!(
            response.record_count,
            Some(RecordCount {
                count: 2,
                partial: false
            })
        );
    }

    #[test]
    fn test_poll_begin_timestamp_per_version() {
        let storage = store();
        for secs in [10, 20, 30] {
            storage
                .save_content(
                    ContentBlockEntity::new(
                        ContentBinding::new(STIX),
                        "x",
                        Utc.timestamp_opt(secs, 0).unwrap(),
                    ),
                    &["c1".to_string()],
                )
                .unwrap();
        }
        let service = storage.get_service("poll-a").unwrap();
        let mut request = PollRequest::new("p1", "c1");
        request.exclusive_begin_timestamp = Some(Utc.timestamp_opt(10, 0).unwrap());

        let Message::PollResponse(v11) = PollHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V11, None),
                Message::PollRequest(request.clone()),
            )
            .unwrap()
        else {
            panic!("expected poll response");
        };
        assert_eq!(v11.begin_timestamp, Some(Utc.timestamp_opt(10, 0).unwrap()));

        let Message::PollResponse(v10) = PollHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V10, None),
                Message::PollRequest(request.clone()),
            )
            .unwrap()
        else {
            panic!("expected poll response");
        };
        assert_eq!(v10.begin_timestamp, Some(Utc.timestamp_opt(20, 0).unwrap()));

        request.exclusive_begin_timestamp = Some(Utc.timestamp_opt(30, 0).unwrap());
        let Message::PollResponse(empty) = PollHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V10, None),
                Message::PollRequest(request),
            )
            .unwrap()
        else {
            panic!("expected poll response");
        };
        assert_eq!(empty.begin_timestamp, None);
    }

    #[test]
    fn test_poll_count_only() {
        let storage = store();
        storage
            .save_content(
                ContentBlockEntity::new(ContentBinding::new(STIX), "x", Utc::now()),
                &["c1".to_string()],
            )
            .unwrap();

        let mut request = PollRequest::new("p1", "c1");
        request.response_type = ResponseType::CountOnly;
        let Message::PollResponse(response) = poll(&storage, request) else {
            panic!("expected poll response");
        };
        assert!(response.content_blocks.is_empty());
        assert_eq!(response.record_count.map(|r| r.count), Some(1));
    }

    #[test]
    fn test_poll_unknown_collection() {
        let storage = store();
        let status = expect_status(poll(&storage, PollRequest::new("p1", "missing")));
        assert_eq!(status.status_type, StatusType::NotFound);
        assert_eq!(status.details[0].values, vec!["missing"]);
    }

    #[test]
    fn test_poll_subscription_not_supported() {
        let storage = store();
        let mut request = PollRequest::new("p1", "c1");
        request.subscription_id = Some("sub-1".to_string());
        let status = expect_status(poll(&storage, request));
        assert_eq!(status.status_type, StatusType::NotFound);
    }

    #[test]
    fn test_poll_no_common_binding() {
        let storage = store();
        let mut request = PollRequest::new("p1", "c1");
        request.content_bindings = vec![ContentBinding::new(CAP)];
        let status = expect_status(poll(&storage, request));
        assert_eq!(status.status_type, StatusType::UnsupportedContent);
        assert_eq!(status.details[0].values, vec![STIX]);
    }

    #[test]
    fn test_usable_overlap_drops_disjoint_subtypes() {
        let supported = vec![ContentBinding::with_subtypes(STIX, ["a"])];
        let requested = vec![ContentBinding::with_subtypes(STIX, ["b"])];
        let overlap = intersect(&supported, &requested);
        assert_eq!(overlap, vec![ContentBinding::new(STIX)]);
        assert!(PollHandler::usable_overlap(&supported, &requested, overlap).is_empty());

        let requested = vec![ContentBinding::new(STIX)];
        let overlap = intersect(&supported, &requested);
        assert_eq!(
            PollHandler::usable_overlap(&supported, &requested, overlap),
            supported
        );
    }

    #[test]
    fn test_poll_denied_without_read() {
        let storage = store();
        let mut service = storage.get_service("poll-a").unwrap();
        service.authentication_required = true;
        let account = Account {
            username: "nobody".to_string(),
            is_admin: false,
            permissions: BTreeMap::new(),
        };
        let err = PollHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V11, Some(&account)),
                Message::PollRequest(PollRequest::new("p1", "c1")),
            )
            .unwrap_err();
        assert_eq!(err.status_type(), StatusType::Denied);
    }

    #[test]
    fn test_collection_information() {
        let storage = store();
        storage
            .save_content(
                ContentBlockEntity::new(ContentBinding::new(STIX), "x", Utc::now()),
                &["c1".to_string()],
            )
            .unwrap();
        let service = storage.get_service("mgmt-a").unwrap();

        let response = CollectionManagementHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V11, None),
                Message::CollectionInformationRequest(CollectionInformationRequest {
                    message_id: "7".to_string(),
                }),
            )
            .unwrap();
        let Message::CollectionInformationResponse(response) = response else {
            panic!("expected collection information response");
        };
        assert_eq!(response.in_response_to, "7");
        assert_eq!(response.collections.len(), 2);

        let c1 = &response.collections[0];
        assert_eq!(c1.name, "c1");
        assert_eq!(c1.volume, Some(1));
        assert_eq!(c1.polling_services.len(), 1);
        assert_eq!(
            c1.polling_services[0].address,
            "http://taxii.example.com/services/poll"
        );
        assert_eq!(c1.receiving_inboxes.len(), 1);
        assert_eq!(c1.receiving_inboxes[0].content_bindings.len(), 2);
    }

    #[test]
    fn test_collection_information_filters_unreadable() {
        let storage = store();
        let mut service = storage.get_service("mgmt-a").unwrap();
        service.authentication_required = true;
        let mut permissions = BTreeMap::new();
        permissions.insert("c2".to_string(), Permission::Read);
        let account = Account {
            username: "reader".to_string(),
            is_admin: false,
            permissions,
        };

        let response = CollectionManagementHandler
            .handle(
                &ctx(&storage, &service, ProtocolVersion::V11, Some(&account)),
                Message::CollectionInformationRequest(CollectionInformationRequest {
                    message_id: "7".to_string(),
                }),
            )
            .unwrap();
        let Message::CollectionInformationResponse(response) = response else {
            panic!("expected collection information response");
        };
        let names: Vec<&str> = response.collections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c2"]);
    }
}
