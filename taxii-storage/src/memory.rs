//! In-memory storage with optional JSON snapshots.

use crate::api::Persistence;
use crate::entity::{
    CollectionDefinition, ContentBlockEntity, InboxMessageEntity, PollQuery, PollResult,
    ServiceDefinition,
};
use crate::error::StorageError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::Path;
use taxii_protocol::ContentBinding;

const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBlock {
    block: ContentBlockEntity,
    collections: Vec<String>,
}

/// Received content. Services and collections come from configuration and
/// are not part of snapshots.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ContentData {
    #[serde(default)]
    format: u32,
    inbox_messages: Vec<InboxMessageEntity>,
    blocks: Vec<StoredBlock>,
    next_id: u64,
}

/// Borrowed view of [`ContentData`] written to snapshots.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    inbox_messages: &'a [InboxMessageEntity],
    blocks: &'a [StoredBlock],
    next_id: u64,
}

impl ContentData {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
struct Inner {
    services: Vec<ServiceDefinition>,
    collections: Vec<CollectionDefinition>,
    content: ContentData,
}

impl Inner {
    fn check_collections(&self, names: &[String]) -> Result<(), StorageError> {
        for name in names {
            if !self.collections.iter().any(|c| &c.name == name) {
                return Err(StorageError::CollectionNotFound(name.clone()));
            }
        }
        Ok(())
    }

    fn insert_block(
        &mut self,
        mut block: ContentBlockEntity,
        collections: Vec<String>,
    ) -> ContentBlockEntity {
        block.id = self.content.next_id();
        self.content.blocks.push(StoredBlock {
            block: block.clone(),
            collections,
        });
        block
    }
}

/// Storage backend keeping everything in memory.
///
/// A single lock guards all state, so each [`Persistence`] call is atomic.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Writes received content to `path`, replacing it atomically.
    ///
    /// Content is serialized under the read lock; file I/O happens after it
    /// is released.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StorageError> {
        let (bytes, messages, blocks) = {
            let inner = self.inner.read();
            let snapshot = SnapshotRef {
                format: SNAPSHOT_FORMAT,
                inbox_messages: &inner.content.inbox_messages,
                blocks: &inner.content.blocks,
                next_id: inner.content.next_id,
            };
            (
                serde_json::to_vec(&snapshot)?,
                inner.content.inbox_messages.len(),
                inner.content.blocks.len(),
            )
        };

        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        tracing::info!(
            "Saved snapshot to {}: {} inbox messages, {} content blocks",
            path.display(),
            messages,
            blocks
        );
        Ok(())
    }

    /// Loads content previously written by [`MemoryStore::save_snapshot`].
    ///
    /// Returns `false` when no snapshot exists at `path`.
    pub fn load_snapshot(&self, path: &Path) -> Result<bool, StorageError> {
        if !path.exists() {
            return Ok(false);
        }

        let file = File::open(path)?;
        let data: ContentData = serde_json::from_reader(BufReader::new(file))?;

        let mut inner = self.inner.write();
        let known: Vec<String> = inner.collections.iter().map(|c| c.name.clone()).collect();
        for stored in &data.blocks {
            for name in stored.collections.iter().filter(|n| !known.contains(n)) {
                tracing::warn!(
                    "Snapshot block {} references unknown collection '{}'",
                    stored.block.id,
                    name
                );
            }
        }

        tracing::info!(
            "Loaded snapshot from {}: {} inbox messages, {} content blocks",
            path.display(),
            data.inbox_messages.len(),
            data.blocks.len()
        );
        inner.content = data;
        Ok(true)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistence for MemoryStore {
    fn create_services_from_object(
        &self,
        services: Vec<ServiceDefinition>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();

        for (i, service) in services.iter().enumerate() {
            service.validate()?;
            let earlier = inner.services.iter().chain(services[..i].iter());
            for other in earlier {
                if other.id == service.id {
                    return Err(StorageError::DuplicateService(service.id.clone()));
                }
                if other.address == service.address {
                    return Err(StorageError::DuplicateService(format!(
                        "{} (address {})",
                        service.id, service.address
                    )));
                }
            }
        }

        for service in services {
            tracing::debug!(
                "Registered {} service '{}' at {}",
                service.service_type,
                service.id,
                service.address
            );
            inner.services.push(service);
        }
        Ok(())
    }

    fn create_collection(&self, collection: CollectionDefinition) -> Result<(), StorageError> {
        let mut inner = self.inner.write();

        if inner.collections.iter().any(|c| c.name == collection.name) {
            return Err(StorageError::DuplicateCollection(collection.name));
        }
        for id in &collection.service_ids {
            if !inner.services.iter().any(|s| &s.id == id) {
                return Err(StorageError::ServiceNotFound(id.clone()));
            }
        }

        tracing::debug!(
            "Registered collection '{}' on {} services",
            collection.name,
            collection.service_ids.len()
        );
        inner.collections.push(collection);
        Ok(())
    }

    fn services(&self) -> Vec<ServiceDefinition> {
        self.inner.read().services.clone()
    }

    fn get_service(&self, id: &str) -> Option<ServiceDefinition> {
        self.inner
            .read()
            .services
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    fn get_service_by_address(&self, address: &str) -> Option<ServiceDefinition> {
        let address = address.trim_end_matches('/');
        self.inner
            .read()
            .services
            .iter()
            .find(|s| s.address.trim_end_matches('/') == address)
            .cloned()
    }

    fn get_supported_bindings(
        &self,
        service_id: &str,
    ) -> Result<Vec<ContentBinding>, StorageError> {
        self.inner
            .read()
            .services
            .iter()
            .find(|s| s.id == service_id)
            .map(|s| s.supported_content.clone())
            .ok_or_else(|| StorageError::ServiceNotFound(service_id.to_string()))
    }

    fn get_collections(&self, service_id: &str) -> Vec<CollectionDefinition> {
        self.inner
            .read()
            .collections
            .iter()
            .filter(|c| c.is_attached_to(service_id))
            .cloned()
            .collect()
    }

    fn get_collection(&self, name: &str, service_id: &str) -> Option<CollectionDefinition> {
        self.inner
            .read()
            .collections
            .iter()
            .find(|c| c.name == name && c.is_attached_to(service_id))
            .cloned()
    }

    fn content_count(&self, collection: &str) -> Result<u64, StorageError> {
        let inner = self.inner.read();
        inner.check_collections(&[collection.to_string()])?;
        Ok(inner
            .content
            .blocks
            .iter()
            .filter(|b| b.collections.iter().any(|c| c == collection))
            .count() as u64)
    }

    fn save_inbox_message(
        &self,
        mut message: InboxMessageEntity,
        blocks: Vec<(ContentBlockEntity, Vec<String>)>,
    ) -> Result<InboxMessageEntity, StorageError> {
        let mut inner = self.inner.write();

        inner.check_collections(&message.destination_collections)?;
        for (_, collections) in &blocks {
            inner.check_collections(collections)?;
        }

        message.id = inner.content.next_id();
        message.content_block_count = blocks.len();
        for (mut block, collections) in blocks {
            block.inbox_message_id = Some(message.id);
            inner.insert_block(block, collections);
        }
        inner.content.inbox_messages.push(message.clone());

        tracing::debug!(
            "Stored inbox message {} with {} content blocks",
            message.message_id,
            message.content_block_count
        );
        Ok(message)
    }

    fn save_content(
        &self,
        block: ContentBlockEntity,
        collections: &[String],
    ) -> Result<ContentBlockEntity, StorageError> {
        let mut inner = self.inner.write();
        inner.check_collections(collections)?;
        Ok(inner.insert_block(block, collections.to_vec()))
    }

    fn poll_content(
        &self,
        collection: &str,
        query: &PollQuery,
    ) -> Result<PollResult, StorageError> {
        let inner = self.inner.read();
        inner.check_collections(&[collection.to_string()])?;

        let mut blocks: Vec<ContentBlockEntity> = inner
            .content
            .blocks
            .iter()
            .filter(|b| b.collections.iter().any(|c| c == collection))
            .filter(|b| query.matches(&b.block))
            .map(|b| b.block.clone())
            .collect();
        blocks.sort_by(|a, b| {
            a.timestamp_label
                .cmp(&b.timestamp_label)
                .then(a.id.cmp(&b.id))
        });

        let total = blocks.len();
        if let Some(limit) = query.limit {
            blocks.truncate(limit);
        }
        Ok(PollResult { blocks, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use taxii_protocol::ServiceType;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut inbox = ServiceDefinition::new("inbox-a", ServiceType::Inbox, "/services/inbox-a");
        inbox.supported_content = vec![ContentBinding::new("b1")];
        store
            .create_services_from_object(vec![
                inbox,
                ServiceDefinition::new("poll-a", ServiceType::Poll, "/services/poll-a"),
            ])
            .unwrap();
        store
            .create_collection(CollectionDefinition::new("c1").with_services(["inbox-a", "poll-a"]))
            .unwrap();
        store
            .create_collection(CollectionDefinition::new("c2").with_services(["poll-a"]))
            .unwrap();
        store
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn inbox_message(id: &str) -> InboxMessageEntity {
        InboxMessageEntity {
            id: 0,
            message_id: id.to_string(),
            service_id: "inbox-a".to_string(),
            message: None,
            received_at: at(0),
            destination_collections: Vec::new(),
            record_count: None,
            partial_count: false,
            content_block_count: 0,
        }
    }

    #[test]
    fn test_service_lookup() {
        let store = store();
        assert_eq!(store.services().len(), 2);
        assert_eq!(
            store.get_service_by_address("/services/poll-a/").unwrap().id,
            "poll-a"
        );
        assert!(store.get_service_by_address("/services/missing").is_none());
        assert_eq!(
            store.get_supported_bindings("inbox-a").unwrap(),
            vec![ContentBinding::new("b1")]
        );
        assert!(matches!(
            store.get_supported_bindings("nope"),
            Err(StorageError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_services_rejected() {
        let store = store();
        let err = store
            .create_services_from_object(vec![ServiceDefinition::new(
                "inbox-a",
                ServiceType::Inbox,
                "/other",
            )])
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateService(_)));

        let err = store
            .create_services_from_object(vec![
                ServiceDefinition::new("x", ServiceType::Inbox, "/same"),
                ServiceDefinition::new("y", ServiceType::Poll, "/same"),
            ])
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateService(_)));
        // Nothing from the failed batch was registered
        assert!(store.get_service("x").is_none());
    }

    #[test]
    fn test_collection_needs_known_services() {
        let store = store();
        let err = store
            .create_collection(CollectionDefinition::new("c3").with_services(["ghost"]))
            .unwrap_err();
        assert!(matches!(err, StorageError::ServiceNotFound(_)));
        assert!(matches!(
            store.create_collection(CollectionDefinition::new("c1")),
            Err(StorageError::DuplicateCollection(_))
        ));
    }

    #[test]
    fn test_collections_by_service() {
        let store = store();
        assert_eq!(store.get_collections("poll-a").len(), 2);
        assert_eq!(store.get_collections("inbox-a").len(), 1);
        assert!(store.get_collection("c2", "inbox-a").is_none());
        assert!(store.get_collection("c2", "poll-a").is_some());
    }

    #[test]
    fn test_inbox_and_poll() {
        let store = store();
        let blocks = vec![
            (
                ContentBlockEntity::new(ContentBinding::new("b1"), "one", at(10)),
                names(&["c1"]),
            ),
            (
                ContentBlockEntity::new(ContentBinding::new("b1"), "two", at(20)),
                names(&["c1", "c2"]),
            ),
        ];
        let saved = store.save_inbox_message(inbox_message("m1"), blocks).unwrap();
        assert_eq!(saved.content_block_count, 2);
        assert!(saved.id > 0);

        let all = store.poll_content("c1", &PollQuery::default()).unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.blocks[0].content, "one");
        assert_eq!(all.blocks[0].inbox_message_id, Some(saved.id));

        let window = PollQuery {
            begin: Some(at(10)),
            end: Some(at(20)),
            ..Default::default()
        };
        let result = store.poll_content("c1", &window).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].content, "two");

        assert_eq!(store.content_count("c2").unwrap(), 1);
    }

    #[test]
    fn test_poll_limit_reports_total() {
        let store = store();
        for i in 0..5 {
            store
                .save_content(
                    ContentBlockEntity::new(ContentBinding::new("b1"), format!("{i}"), at(i)),
                    &names(&["c1"]),
                )
                .unwrap();
        }
        let result = store
            .poll_content(
                "c1",
                &PollQuery {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.blocks.len(), 2);
        assert_eq!(result.total, 5);
        assert!(result.is_partial());
    }

    #[test]
    fn test_unknown_collection_writes_nothing() {
        let store = store();
        let blocks = vec![
            (
                ContentBlockEntity::new(ContentBinding::new("b1"), "ok", at(1)),
                names(&["c1"]),
            ),
            (
                ContentBlockEntity::new(ContentBinding::new("b1"), "bad", at(2)),
                names(&["missing"]),
            ),
        ];
        let err = store.save_inbox_message(inbox_message("m1"), blocks).unwrap_err();
        assert!(matches!(err, StorageError::CollectionNotFound(_)));
        assert_eq!(store.content_count("c1").unwrap(), 0);
        assert!(store.poll_content("missing", &PollQuery::default()).is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content.json");

        let first = store();
        assert!(!first.load_snapshot(&path).unwrap());
        first
            .save_content(
                ContentBlockEntity::new(
                    ContentBinding::with_subtypes("b1", ["x"]),
                    "payload",
                    at(5),
                ),
                &names(&["c1"]),
            )
            .unwrap();
        first.save_snapshot(&path).unwrap();

        let second = store();
        assert!(second.load_snapshot(&path).unwrap());
        let result = second.poll_content("c1", &PollQuery::default()).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].content, "payload");
        assert_eq!(result.blocks[0].binding.subtypes, vec!["x"]);

        // Ids continue after the restored ones
        let next = second
            .save_content(
                ContentBlockEntity::new(ContentBinding::new("b1"), "later", at(6)),
                &names(&["c1"]),
            )
            .unwrap();
        assert!(next.id > result.blocks[0].id);
    }

    #[test]
    fn test_snapshot_while_readers_hold_the_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content.json");
        let saved = store();
        saved
            .save_content(
                ContentBlockEntity::new(ContentBinding::new("b1"), "payload", at(5)),
                &names(&["c1"]),
            )
            .unwrap();

        let reader = saved.inner.read();
        saved.save_snapshot(&path).unwrap();
        drop(reader);

        let restored = store();
        assert!(restored.load_snapshot(&path).unwrap());
        assert_eq!(restored.content_count("c1").unwrap(), 1);
    }

    proptest! {
        #[test]
        fn prop_poll_is_sorted_and_windowed(
            stamps in prop::collection::vec(0i64..100, 0..20),
            begin in 0i64..100,
            end in 0i64..100,
        ) {
            let store = store();
            for (i, ts) in stamps.iter().enumerate() {
                store
                    .save_content(
                        ContentBlockEntity::new(ContentBinding::new("b1"), format!("{i}"), at(*ts)),
                        &names(&["c1"]),
                    )
                    .unwrap();
            }
            let query = PollQuery {
                begin: Some(at(begin)),
                end: Some(at(end)),
                ..Default::default()
            };
            let result = store.poll_content("c1", &query).unwrap();
            let expected = stamps.iter().filter(|ts| **ts > begin && **ts <= end).count();
            prop_assert_eq!(result.blocks.len(), expected);
            for pair in result.blocks.windows(2) {
                prop_assert!(pair[0].timestamp_label <= pair[1].timestamp_label);
            }
        }
    }
}
