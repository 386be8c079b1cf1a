//! Request dispatch.
//!
//! Every TAXII request goes through the same steps: resolve the service,
//! check credentials, decode, route to the service's handler, handle and
//! render. Any step can end the request early with a status message; the
//! dispatcher always produces a message for the negotiated version.

use crate::auth::{parse_authorization_header, Account, AuthError, AuthManager};
use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::services::{HandlerContext, HandlerRegistry};
use std::sync::Arc;
use taxii_protocol::{
    validate_and_parse, Codec, Message, ProtocolMessage, ProtocolVersion, StatusMessage,
    StatusType, UNKNOWN_MESSAGE_ID,
};
use taxii_storage::{Persistence, ServiceDefinition};

/// Message sent in place of internal error details.
pub const INTERNAL_FAILURE: &str = "Internal server error";

/// The parts of an HTTP request the dispatcher needs.
#[derive(Debug, Clone, Copy)]
pub struct TaxiiRequest<'a> {
    /// Request path, matched against service addresses.
    pub path: &'a str,
    /// `X-TAXII-Content-Type` header.
    pub content_type: Option<&'a str>,
    /// `Authorization` header.
    pub authorization: Option<&'a str>,
    pub body: &'a [u8],
}

/// Turns TAXII requests into response messages.
pub struct Dispatcher {
    storage: Arc<dyn Persistence>,
    auth: Arc<AuthManager>,
    codec: Codec,
    registry: HandlerRegistry,
    message_bindings: Vec<&'static str>,
    domain: Option<String>,
    xml_validation: bool,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the standard handlers and schema validation
    /// enabled.
    pub fn new(storage: Arc<dyn Persistence>, auth: Arc<AuthManager>, codec: Codec) -> Self {
        let message_bindings = codec
            .versions()
            .iter()
            .map(ProtocolVersion::message_binding)
            .collect();
        Self {
            storage,
            auth,
            codec,
            registry: HandlerRegistry::standard(),
            message_bindings,
            domain: None,
            xml_validation: true,
            metrics: None,
        }
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_xml_validation(mut self, enabled: bool) -> Self {
        self.xml_validation = enabled;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Handles one request. Never fails: every outcome is a message.
    pub fn dispatch(&self, request: &TaxiiRequest<'_>) -> ProtocolMessage {
        let content_type = request.content_type.unwrap_or_default();
        let version = match self.codec.version_for(content_type) {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("Rejected request to {}: {}", request.path, e);
                let message = status(
                    UNKNOWN_MESSAGE_ID,
                    StatusType::UnsupportedMessage,
                    format!("Unsupported message binding '{}'", content_type),
                );
                return self.finish(ProtocolVersion::LATEST, message);
            }
        };

        let Some(service) = self.storage.get_service_by_address(request.path) else {
            tracing::debug!("No service at {}", request.path);
            let message = status(
                UNKNOWN_MESSAGE_ID,
                StatusType::NotFound,
                format!("No service at '{}'", request.path),
            );
            return self.finish(version, message);
        };

        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[&service.service_type.to_string()])
                .start_timer()
        });
        let message = self.process(version, &service, request);
        drop(timer);

        self.finish(version, message)
    }

    /// Answers a request whose body never reached the codec, in the version
    /// its content type names or the latest one.
    pub fn reject(
        &self,
        content_type: Option<&str>,
        status_type: StatusType,
        message: impl Into<String>,
    ) -> ProtocolMessage {
        let version = content_type
            .and_then(|ct| self.codec.version_for(ct).ok())
            .unwrap_or(ProtocolVersion::LATEST);
        self.finish(version, status(UNKNOWN_MESSAGE_ID, status_type, message))
    }

    /// Serializes a message. If the message cannot be written, a failure
    /// status is written instead.
    pub fn render(&self, message: &ProtocolMessage) -> Result<Vec<u8>, ServerError> {
        match self.codec.encode(message) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!("Failed to serialize {}: {}", message.kind(), e);
                let fallback = ProtocolMessage::new(
                    message.version,
                    StatusMessage::new(UNKNOWN_MESSAGE_ID, StatusType::Failure)
                        .with_message(INTERNAL_FAILURE),
                );
                Ok(self.codec.encode(&fallback)?)
            }
        }
    }

    fn process(
        &self,
        version: ProtocolVersion,
        service: &ServiceDefinition,
        request: &TaxiiRequest<'_>,
    ) -> Message {
        let account = match self.authenticate(service, request.authorization) {
            Ok(account) => account,
            Err(reason) => return status(UNKNOWN_MESSAGE_ID, StatusType::Unauthorized, reason),
        };

        if !service.available {
            return status(
                UNKNOWN_MESSAGE_ID,
                StatusType::Failure,
                "The service is not available",
            );
        }

        let message = match validate_and_parse(version, request.body, self.xml_validation) {
            Ok(parsed) => parsed.message,
            Err(e) => {
                tracing::warn!("Bad message for service '{}': {}", service.id, e);
                let err = ServerError::from(e);
                return status(UNKNOWN_MESSAGE_ID, err.status_type(), err_message(&err));
            }
        };

        let kind = message.kind();
        let in_response_to = message.message_id().to_string();
        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[kind.as_str()]).inc();
        }
        tracing::info!(
            "{} {} for service '{}' (message_id={})",
            version,
            kind,
            service.id,
            in_response_to
        );

        let Some(handler) = self.registry.route(service.service_type, kind) else {
            return status(
                &in_response_to,
                StatusType::NotFound,
                format!("Service '{}' does not accept {}", service.id, kind),
            );
        };

        let ctx = HandlerContext {
            service,
            version,
            account: account.as_ref(),
            storage: self.storage.as_ref(),
            domain: self.domain.as_deref(),
            message_bindings: &self.message_bindings,
            metrics: self.metrics.as_deref(),
        };

        match handler.handle(&ctx, message) {
            Ok(response) => response,
            Err(e) if e.is_client_facing() => {
                tracing::info!("Request {} to '{}' refused: {}", in_response_to, service.id, e);
                status(&in_response_to, e.status_type(), err_message(&e))
            }
            Err(e) => {
                tracing::error!("Handler for service '{}' failed: {}", service.id, e);
                status(&in_response_to, StatusType::Failure, INTERNAL_FAILURE)
            }
        }
    }

    /// Resolves the caller. Returns the reason for an unauthorized status on
    /// failure.
    fn authenticate(
        &self,
        service: &ServiceDefinition,
        header: Option<&str>,
    ) -> Result<Option<Account>, String> {
        let account = match header {
            None => None,
            Some(value) => {
                let credentials = parse_authorization_header(value).map_err(|e| {
                    self.record_auth_failure(&e);
                    tracing::warn!("Invalid Authorization header: {}", e);
                    e.to_string()
                })?;

                match self.auth.authenticate(&credentials) {
                    Ok(account) => Some(account),
                    Err(e) => {
                        self.record_auth_failure(&e);
                        tracing::info!("Rejected credentials for '{}': {}", service.id, e);
                        None
                    }
                }
            }
        };

        if service.authentication_required && account.is_none() {
            return Err("Authentication required".to_string());
        }
        Ok(account)
    }

    fn record_auth_failure(&self, error: &AuthError) {
        if let Some(ref metrics) = self.metrics {
            let reason = match error {
                AuthError::InvalidAuthHeader(_) => "invalid_header",
                AuthError::InvalidCredentials => "invalid_credentials",
                AuthError::TokenExpired => "token_expired",
            };
            metrics.auth_failures_total.with_label_values(&[reason]).inc();
        }
    }

    /// Tags the message with its version, folding the status type into one
    /// the version defines.
    fn finish(&self, version: ProtocolVersion, mut message: Message) -> ProtocolMessage {
        if let Message::StatusMessage(ref mut status) = message {
            status.status_type = version.adapter().status_type(status.status_type);
            if let Some(ref metrics) = self.metrics {
                metrics
                    .statuses_total
                    .with_label_values(&[status.status_type.as_str()])
                    .inc();
            }
        }
        ProtocolMessage::new(version, message)
    }
}

fn status(in_response_to: &str, status_type: StatusType, message: impl Into<String>) -> Message {
    StatusMessage::new(in_response_to, status_type)
        .with_message(message)
        .into()
}

/// Client-facing text of an error, without the variant prefix.
fn err_message(error: &ServerError) -> String {
    match error {
        ServerError::Protocol(e) => e.to_string(),
        ServerError::Denied(msg) | ServerError::NotFound(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountConfig, AuthConfig};
    use crate::services::ServiceHandler;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use taxii_protocol::{
        serialize, DiscoveryRequest, MessageKind, PollRequest, ServiceType, VID_TAXII_XML_10,
        VID_TAXII_XML_11,
    };
    use taxii_storage::{CollectionDefinition, MemoryStore, StorageError};

    const USERNAME: &str = "some-username";
    const PASSWORD: &str = "some-password";
    const INBOX: &str = "/path/inbox";
    const DISCOVERY: &str = "/path/discovery";

    fn storage() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        let mut inbox = ServiceDefinition::new("inbox-A", ServiceType::Inbox, INBOX);
        inbox.authentication_required = true;
        let mut discovery =
            ServiceDefinition::new("discovery-A", ServiceType::Discovery, DISCOVERY);
        discovery.authentication_required = true;
        discovery.advertised_services = vec!["inbox-A".to_string(), "discovery-A".to_string()];
        let mut offline = ServiceDefinition::new("offline", ServiceType::Discovery, "/offline");
        offline.available = false;
        let open = ServiceDefinition::new("open-inbox", ServiceType::Inbox, "/open/inbox");
        store
            .create_services_from_object(vec![inbox, discovery, offline, open])
            .unwrap();
        store
            .create_collection(CollectionDefinition::new("c1").with_services(["open-inbox"]))
            .unwrap();
        Arc::new(store)
    }

    fn auth() -> Arc<AuthManager> {
        Arc::new(AuthManager::from_config(&AuthConfig {
            token_ttl_secs: 60,
            accounts: vec![AccountConfig {
                username: USERNAME.to_string(),
                password: Some(PASSWORD.to_string()),
                ..Default::default()
            }],
        }))
    }

    fn dispatcher() -> (Dispatcher, Arc<AuthManager>) {
        let auth = auth();
        let dispatcher = Dispatcher::new(storage(), auth.clone(), Codec::new())
            .with_domain(Some("localhost".to_string()))
            .with_metrics(Arc::new(Metrics::new().unwrap()));
        (dispatcher, auth)
    }

    fn binding(version: ProtocolVersion) -> &'static str {
        match version {
            ProtocolVersion::V10 => VID_TAXII_XML_10,
            ProtocolVersion::V11 => VID_TAXII_XML_11,
        }
    }

    fn discovery_request(version: ProtocolVersion) -> Vec<u8> {
        serialize(&ProtocolMessage::new(
            version,
            Message::DiscoveryRequest(DiscoveryRequest {
                message_id: "123".to_string(),
            }),
        ))
        .unwrap()
    }

    fn basic_header(username: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
    }

    fn send(
        dispatcher: &Dispatcher,
        version: ProtocolVersion,
        path: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> ProtocolMessage {
        let response = dispatcher.dispatch(&TaxiiRequest {
            path,
            content_type: Some(binding(version)),
            authorization,
            body,
        });
        assert_eq!(response.version, version);

        // Every response must survive a schema-validated round trip
        let rendered = dispatcher.render(&response).unwrap();
        let reparsed = validate_and_parse(version, &rendered, true).unwrap();
        assert_eq!(reparsed.kind(), response.kind());
        response
    }

    fn status_of(message: &ProtocolMessage) -> &StatusMessage {
        match &message.message {
            Message::StatusMessage(status) => status,
            other => panic!("expected status message, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unauthorized_request() {
        let (dispatcher, _) = dispatcher();
        for version in ProtocolVersion::ALL {
            let response = send(&dispatcher, version, INBOX, None, b"invalid-body");
            let status = status_of(&response);
            assert_eq!(status.status_type, StatusType::Unauthorized);
            assert_eq!(status.in_response_to, UNKNOWN_MESSAGE_ID);
        }
    }

    #[test]
    fn test_token_then_bad_message() {
        let (dispatcher, auth) = dispatcher();
        let token = auth.issue_token(USERNAME, PASSWORD).unwrap();
        let header = format!("Bearer {token}");

        for version in ProtocolVersion::ALL {
            let response = send(&dispatcher, version, INBOX, Some(&header), b"invalid-body");
            assert_eq!(status_of(&response).status_type, StatusType::BadMessage);

            let response = send(
                &dispatcher,
                version,
                DISCOVERY,
                Some(&header),
                &discovery_request(version),
            );
            assert_eq!(response.kind(), MessageKind::DiscoveryResponse);
        }
    }

    #[test]
    fn test_basic_auth() {
        let (dispatcher, _) = dispatcher();
        let header = basic_header(USERNAME, PASSWORD);

        for version in ProtocolVersion::ALL {
            let response = send(&dispatcher, version, INBOX, Some(&header), b"invalid-body");
            let status = status_of(&response);
            assert_eq!(status.status_type, StatusType::BadMessage);
            assert_eq!(status.message.as_deref(), Some("Request was invalid XML"));

            let response = send(
                &dispatcher,
                version,
                DISCOVERY,
                Some(&header),
                &discovery_request(version),
            );
            let Message::DiscoveryResponse(discovery) = &response.message else {
                panic!("expected discovery response");
            };
            assert_eq!(discovery.in_response_to, "123");
            // discovery-A and inbox-A, one protocol binding each
            assert_eq!(discovery.service_instances.len(), 2);
        }
    }

    #[test]
    fn test_wrong_password_is_unauthorized() {
        let (dispatcher, _) = dispatcher();
        let header = basic_header(USERNAME, "wrong");
        let response = send(
            &dispatcher,
            ProtocolVersion::V11,
            DISCOVERY,
            Some(&header),
            &discovery_request(ProtocolVersion::V11),
        );
        assert_eq!(status_of(&response).status_type, StatusType::Unauthorized);
    }

    #[test]
    fn test_invalid_basic_auth_header() {
        let (dispatcher, _) = dispatcher();
        for version in ProtocolVersion::ALL {
            let response = send(
                &dispatcher,
                version,
                DISCOVERY,
                Some("Basic somevalue"),
                &discovery_request(version),
            );
            let status = status_of(&response);
            assert_eq!(status.status_type, StatusType::Unauthorized);
            assert_eq!(
                status.message.as_deref(),
                Some("Can't decode Basic Auth header value")
            );
        }
    }

    #[test]
    fn test_unknown_auth_scheme() {
        let (dispatcher, _) = dispatcher();
        let header = format!("Foo {}", STANDARD.encode(format!("{USERNAME}:{PASSWORD}")));
        for version in ProtocolVersion::ALL {
            let response = send(
                &dispatcher,
                version,
                DISCOVERY,
                Some(&header),
                &discovery_request(version),
            );
            assert_eq!(status_of(&response).status_type, StatusType::Unauthorized);
        }
    }

    #[test]
    fn test_malformed_header_on_open_service() {
        let (dispatcher, _) = dispatcher();
        let response = send(
            &dispatcher,
            ProtocolVersion::V11,
            "/open/inbox",
            Some("Basic !!"),
            b"<x/>",
        );
        assert_eq!(status_of(&response).status_type, StatusType::Unauthorized);
    }

    #[test]
    fn test_unknown_content_type() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher.dispatch(&TaxiiRequest {
            path: INBOX,
            content_type: Some("application/json"),
            authorization: None,
            body: b"{}",
        });
        assert_eq!(response.version, ProtocolVersion::V11);
        assert_eq!(status_of(&response).status_type, StatusType::UnsupportedMessage);

        let response = dispatcher.dispatch(&TaxiiRequest {
            path: INBOX,
            content_type: None,
            authorization: None,
            body: b"{}",
        });
        assert_eq!(status_of(&response).status_type, StatusType::UnsupportedMessage);
    }

    #[test]
    fn test_unknown_service() {
        let (dispatcher, _) = dispatcher();
        let response = send(&dispatcher, ProtocolVersion::V10, "/nope", None, b"");
        assert_eq!(status_of(&response).status_type, StatusType::NotFound);
    }

    #[test]
    fn test_unavailable_service() {
        let (dispatcher, _) = dispatcher();
        let response = send(
            &dispatcher,
            ProtocolVersion::V11,
            "/offline",
            None,
            &discovery_request(ProtocolVersion::V11),
        );
        assert_eq!(status_of(&response).status_type, StatusType::Failure);
    }

    #[test]
    fn test_wrong_message_for_service() {
        let (dispatcher, _) = dispatcher();
        let body = serialize(&ProtocolMessage::new(
            ProtocolVersion::V11,
            Message::PollRequest(PollRequest::new("55", "c1")),
        ))
        .unwrap();
        let response = send(&dispatcher, ProtocolVersion::V11, "/open/inbox", None, &body);
        let status = status_of(&response);
        assert_eq!(status.status_type, StatusType::NotFound);
        assert_eq!(status.in_response_to, "55");
    }

    #[test]
    fn test_trailing_slash_resolves_service() {
        let (dispatcher, _) = dispatcher();
        let header = basic_header(USERNAME, PASSWORD);
        let response = send(
            &dispatcher,
            ProtocolVersion::V11,
            "/path/discovery/",
            Some(&header),
            &discovery_request(ProtocolVersion::V11),
        );
        assert_eq!(response.kind(), MessageKind::DiscoveryResponse);
    }

    struct FailingHandler(fn() -> Result<Message, ServerError>);

    impl ServiceHandler for FailingHandler {
        fn service_type(&self) -> ServiceType {
            ServiceType::Discovery
        }

        fn handles(&self, kind: MessageKind) -> bool {
            kind == MessageKind::DiscoveryRequest
        }

        fn handle(
            &self,
            _ctx: &HandlerContext<'_>,
            _message: Message,
        ) -> Result<Message, ServerError> {
            (self.0)()
        }
    }

    fn with_handler(handler: FailingHandler) -> Dispatcher {
        let mut registry = HandlerRegistry::standard();
        registry.register(Box::new(handler));
        Dispatcher::new(storage(), auth(), Codec::new()).with_registry(registry)
    }

    #[test]
    fn test_internal_failure_is_generic() {
        let dispatcher = with_handler(FailingHandler(|| {
            Err(StorageError::CollectionNotFound("secret-internal".to_string()).into())
        }));
        let header = basic_header(USERNAME, PASSWORD);
        let response = send(
            &dispatcher,
            ProtocolVersion::V11,
            DISCOVERY,
            Some(&header),
            &discovery_request(ProtocolVersion::V11),
        );
        let status = status_of(&response);
        assert_eq!(status.status_type, StatusType::Failure);
        assert_eq!(status.message.as_deref(), Some(INTERNAL_FAILURE));
        assert_eq!(status.in_response_to, "123");
    }

    #[test]
    fn test_v11_only_status_folds_for_v10() {
        let dispatcher = with_handler(FailingHandler(|| {
            Ok(StatusMessage::new("123", StatusType::Pending).into())
        }));
        let header = basic_header(USERNAME, PASSWORD);

        let response = send(
            &dispatcher,
            ProtocolVersion::V10,
            DISCOVERY,
            Some(&header),
            &discovery_request(ProtocolVersion::V10),
        );
        assert_eq!(status_of(&response).status_type, StatusType::Failure);

        let response = send(
            &dispatcher,
            ProtocolVersion::V11,
            DISCOVERY,
            Some(&header),
            &discovery_request(ProtocolVersion::V11),
        );
        assert_eq!(status_of(&response).status_type, StatusType::Pending);
    }

    #[test]
    fn test_reject_uses_request_version() {
        let (dispatcher, _) = dispatcher();

        let response = dispatcher.reject(Some(VID_TAXII_XML_10), StatusType::Pending, "later");
        assert_eq!(response.version, ProtocolVersion::V10);
        assert_eq!(status_of(&response).status_type, StatusType::Failure);
        assert_eq!(status_of(&response).in_response_to, UNKNOWN_MESSAGE_ID);

        let response = dispatcher.reject(None, StatusType::BadMessage, "too big");
        assert_eq!(response.version, ProtocolVersion::LATEST);
        assert_eq!(status_of(&response).status_type, StatusType::BadMessage);
        assert_eq!(status_of(&response).message.as_deref(), Some("too big"));
    }

    #[test]
    fn test_render_falls_back_when_not_representable() {
        let (dispatcher, _) = dispatcher();
        let mut poll = PollRequest::new("1", "c1");
        poll.response_type = taxii_protocol::ResponseType::CountOnly;
        let message = ProtocolMessage::new(ProtocolVersion::V10, Message::PollRequest(poll));

        let bytes = dispatcher.render(&message).unwrap();
        let decoded = validate_and_parse(ProtocolVersion::V10, &bytes, true).unwrap();
        assert_eq!(status_of(&decoded).status_type, StatusType::Failure);
        assert_eq!(status_of(&decoded).message.as_deref(), Some(INTERNAL_FAILURE));
    }

    #[test]
    fn test_disabled_version() {
        let dispatcher = Dispatcher::new(
            storage(),
            auth(),
            Codec::with_versions(&[ProtocolVersion::V11]),
        );
        let response = dispatcher.dispatch(&TaxiiRequest {
            path: DISCOVERY,
            content_type: Some(VID_TAXII_XML_10),
            authorization: None,
            body: &discovery_request(ProtocolVersion::V10),
        });
        assert_eq!(response.version, ProtocolVersion::V11);
        assert_eq!(status_of(&response).status_type, StatusType::UnsupportedMessage);
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher =
            Dispatcher::new(storage(), auth(), Codec::new()).with_metrics(metrics.clone());
        send(&dispatcher, ProtocolVersion::V11, INBOX, Some("Basic !!"), b"");

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("taxii_auth_failures_total{reason=\"invalid_header\"} 1"));
        assert!(encoded.contains("taxii_statuses_total{status=\"UNAUTHORIZED\"} 1"));
    }
}
