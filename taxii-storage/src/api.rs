//! The storage interface used by the TAXII service handlers.

use crate::entity::{
    CollectionDefinition, ContentBlockEntity, InboxMessageEntity, PollQuery, PollResult,
    ServiceDefinition,
};
use crate::error::StorageError;
use taxii_protocol::ContentBinding;

/// Storage backend for services, collections and content.
///
/// Every method is a single unit of work: implementations must make its
/// writes visible all at once or not at all.
pub trait Persistence: Send + Sync {
    /// Registers services, failing on duplicate ids or addresses.
    fn create_services_from_object(
        &self,
        services: Vec<ServiceDefinition>,
    ) -> Result<(), StorageError>;

    /// Registers a collection. Every referenced service must exist.
    fn create_collection(&self, collection: CollectionDefinition) -> Result<(), StorageError>;

    /// All services in registration order.
    fn services(&self) -> Vec<ServiceDefinition>;

    fn get_service(&self, id: &str) -> Option<ServiceDefinition>;

    fn get_service_by_address(&self, address: &str) -> Option<ServiceDefinition>;

    /// Content an inbox service accepts. Empty accepts any content.
    fn get_supported_bindings(&self, service_id: &str)
        -> Result<Vec<ContentBinding>, StorageError>;

    /// Collections attached to a service.
    fn get_collections(&self, service_id: &str) -> Vec<CollectionDefinition>;

    /// A collection attached to the given service.
    fn get_collection(&self, name: &str, service_id: &str) -> Option<CollectionDefinition>;

    /// Number of blocks stored in a collection.
    fn content_count(&self, collection: &str) -> Result<u64, StorageError>;

    /// Stores an inbox message together with its accepted blocks. Each block
    /// is paired with the collections it is stored into.
    fn save_inbox_message(
        &self,
        message: InboxMessageEntity,
        blocks: Vec<(ContentBlockEntity, Vec<String>)>,
    ) -> Result<InboxMessageEntity, StorageError>;

    /// Stores one block into the given collections.
    fn save_content(
        &self,
        block: ContentBlockEntity,
        collections: &[String],
    ) -> Result<ContentBlockEntity, StorageError>;

    /// Returns matching blocks of a collection, oldest first.
    fn poll_content(&self, collection: &str, query: &PollQuery)
        -> Result<PollResult, StorageError>;
}
