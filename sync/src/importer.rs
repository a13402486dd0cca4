use crate::crdt_meta;
use crate::error::SyncError;
use crate::exporter::PROTOCOL_VERSION;
use crate::protocol::{ChumMessage, RootKind, RootRef};
use glyphstore_codec::ObjectHash;
use glyphstore_crdt::VersionTree;
use glyphstore_store::ObjectStore;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};

/// Request/response transport the importer drives; implemented over a real
/// connection's pipeline in the root facade, and over an in-memory channel
/// in tests (§4.7 "message-oriented; both message types are numeric-tagged").
pub trait Transport {
    fn send(&mut self, message: &ChumMessage) -> Result<(), SyncError>;
    fn recv(&mut self) -> Result<ChumMessage, SyncError>;
}

fn fetch_request(root: &RootRef) -> ChumMessage {
    match root.kind {
        RootKind::Object => ChumMessage::GetObject(root.hash),
        RootKind::Id => ChumMessage::GetIdObject(root.hash),
        RootKind::Blob | RootKind::Clob => ChumMessage::GetBlob(root.hash),
    }
}

fn children_request(root: &RootRef) -> Option<ChumMessage> {
    match root.kind {
        RootKind::Object => Some(ChumMessage::GetObjectChildren(root.hash)),
        RootKind::Id => Some(ChumMessage::GetIdObjectChildren(root.hash)),
        RootKind::Blob | RootKind::Clob => None,
    }
}

/// The driver side of the Chum protocol: walks the peer's accessible roots
/// and their transitive children, verifying and persisting each object
/// (§4.7 Importer).
pub struct Importer<'a> {
    store: &'a ObjectStore,
    keep_running: bool,
    object_filter: Option<Box<dyn Fn(ObjectHash, RootKind) -> bool + Send + Sync>>,
    visited: Mutex<BTreeSet<ObjectHash>>,
    version_tree: Option<&'a Mutex<VersionTree>>,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a ObjectStore, keep_running: bool) -> Self {
        Self {
            store,
            keep_running,
            object_filter: None,
            visited: Mutex::new(BTreeSet::new()),
            version_tree: None,
        }
    }

    pub fn with_object_filter(mut self, filter: impl Fn(ObjectHash, RootKind) -> bool + Send + Sync + 'static) -> Self {
        self.object_filter = Some(Box::new(filter));
        self
    }

    /// Gives the importer somewhere to record version nodes for synced
    /// versioned (`RootKind::Id`) objects (§4.2, §4.7 "update the version
    /// tree where applicable"). Without this, versioned objects are still
    /// content-persisted but never enter a local version tree, so CRDT
    /// merges never see data received from peers.
    pub fn with_version_tree(mut self, version_tree: &'a Mutex<VersionTree>) -> Self {
        self.version_tree = Some(version_tree);
        self
    }

    fn allowed(&self, hash: ObjectHash, kind: RootKind) -> bool {
        match &self.object_filter {
            Some(filter) => filter(hash, kind),
            None => true,
        }
    }

    fn mark_visited(&self, hash: ObjectHash) -> bool {
        self.visited.lock().insert(hash)
    }

    /// Runs the full protocol: version check, one round of accessible-roots
    /// discovery, transitive fetch of every unseen reachable object, then
    /// `FIN` if `keep_running` is false (§4.7 "Protocol (importer view)").
    pub fn run(&self, transport: &mut impl Transport) -> Result<(), SyncError> {
        self.negotiate_version(transport)?;

        transport.send(&ChumMessage::GetAccessibleRoots)?;
        let roots = match transport.recv()? {
            ChumMessage::AccessibleRoots(roots) => roots,
            ChumMessage::Error(message) => return Err(SyncError::Protocol(message)),
            other => return Err(SyncError::Protocol(format!("unexpected reply to GetAccessibleRoots: {other:?}"))),
        };

        let mut queue: VecDeque<RootRef> = roots.into_iter().filter(|r| self.allowed(r.hash, r.kind)).collect();
        while let Some(root) = queue.pop_front() {
            if !self.mark_visited(root.hash) {
                continue;
            }
            let children = self.fetch_and_store(transport, &root)?;
            for child in children {
                if self.allowed(child.hash, child.kind) && !self.visited.lock().contains(&child.hash) {
                    queue.push_back(child);
                }
            }
        }

        if !self.keep_running {
            transport.send(&ChumMessage::Fin)?;
        }
        Ok(())
    }

    fn negotiate_version(&self, transport: &mut impl Transport) -> Result<(), SyncError> {
        transport.send(&ChumMessage::GetProtocolVersion)?;
        match transport.recv()? {
            ChumMessage::ProtocolVersion(remote) if remote == PROTOCOL_VERSION => Ok(()),
            ChumMessage::ProtocolVersion(remote) => Err(SyncError::ProtocolVersionMismatch {
                local: PROTOCOL_VERSION,
                remote,
            }),
            other => Err(SyncError::Protocol(format!("unexpected reply to GetProtocolVersion: {other:?}"))),
        }
    }

    /// Fetches `root`, verifies its hash, persists it, and returns its
    /// child references (empty for BLOB/CLOB roots) (§4.7 step 3). Hash
    /// verification failure is fatal and propagated (§4.7 "Hash
    /// verification failure on importer is fatal").
    fn fetch_and_store(&self, transport: &mut impl Transport, root: &RootRef) -> Result<Vec<RootRef>, SyncError> {
        if self.store.exists(&root.hash) {
            return self.children_of(transport, root);
        }

        transport.send(&fetch_request(root))?;
        match transport.recv()? {
            ChumMessage::ObjectBytes { hash, bytes } => {
                if hash != root.hash {
                    return Err(SyncError::Protocol("reply hash does not match request".into()));
                }
                let computed = ObjectHash::of(&bytes);
                if computed != root.hash {
                    return Err(SyncError::HashMismatch {
                        requested: root.hash,
                        computed,
                    });
                }
                self.store.put(&bytes)?;
                if root.kind == RootKind::Id {
                    self.fetch_and_insert_version_node(transport, root.hash)?;
                }
                self.children_of(transport, root)
            }
            ChumMessage::Error(message) => {
                tracing::warn!(hash = %root.hash, %message, "exporter reported missing object");
                Ok(Vec::new())
            }
            other => Err(SyncError::Protocol(format!("unexpected reply to fetch: {other:?}"))),
        }
    }

    /// Fetches the CRDT meta object for a freshly-stored versioned root and
    /// inserts it into the local version tree, if one was configured
    /// (§4.2, §4.7). Non-fatal if the exporter has no meta object for this
    /// root (older peers, or the root predates CRDT tracking).
    fn fetch_and_insert_version_node(&self, transport: &mut impl Transport, hash: ObjectHash) -> Result<(), SyncError> {
        let Some(version_tree) = self.version_tree else {
            return Ok(());
        };
        transport.send(&ChumMessage::GetCrdtMetaObject(hash))?;
        match transport.recv()? {
            ChumMessage::ObjectBytes { hash: replied, bytes } => {
                if replied != hash {
                    return Err(SyncError::Protocol("crdt meta object reply hash does not match request".into()));
                }
                let node = crdt_meta::decode(&bytes)?;
                version_tree.lock().insert(node)?;
                Ok(())
            }
            ChumMessage::Error(message) => {
                tracing::debug!(%hash, %message, "exporter has no crdt meta object for this root");
                Ok(())
            }
            other => Err(SyncError::Protocol(format!("unexpected reply to GetCrdtMetaObject: {other:?}"))),
        }
    }

    fn children_of(&self, transport: &mut impl Transport, root: &RootRef) -> Result<Vec<RootRef>, SyncError> {
        let Some(request) = children_request(root) else {
            return Ok(Vec::new());
        };
        transport.send(&request)?;
        match transport.recv()? {
            ChumMessage::Children(children) => Ok(children),
            ChumMessage::Error(_) => Ok(Vec::new()),
            other => Err(SyncError::Protocol(format!("unexpected reply to children query: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{Exporter, ExporterEvents};
    use glyphstore_access::PersonId;
    use glyphstore_codec::{encode, id_hash, FieldDef, Kind, Object, Recipe, RecipeRegistry, Reference, Value};
    use glyphstore_crdt::{Op, VersionNode};

    /// Feeds every importer request straight into an exporter's `answer`
    /// and hands the reply back on the next `recv`, standing in for a real
    /// socket round-trip within a single test.
    struct Bridge<'a> {
        exporter: &'a Exporter<'a>,
        pending_reply: Option<ChumMessage>,
    }

    impl<'a> Transport for Bridge<'a> {
        fn send(&mut self, message: &ChumMessage) -> Result<(), SyncError> {
            self.pending_reply = Some(self.exporter.answer(message));
            Ok(())
        }

        fn recv(&mut self) -> Result<ChumMessage, SyncError> {
            self.pending_reply.take().ok_or(SyncError::PeerClosed)
        }
    }

    fn drive_round_trip(exporter: &Exporter, importer: &Importer) -> Result<(), SyncError> {
        let mut bridge = Bridge {
            exporter,
            pending_reply: None,
        };
        importer.run(&mut bridge)
    }

    fn registry() -> RecipeRegistry {
        let registry = RecipeRegistry::new();
        registry.register(Recipe::new(
            "Access",
            vec![
                FieldDef::new("target", Kind::RefObject),
                FieldDef::new("persons", Kind::Set(Box::new(Kind::RefObject))),
                FieldDef::new("groups", Kind::Set(Box::new(Kind::RefObject))),
            ],
        ));
        registry.register(Recipe::new("Note", vec![FieldDef::new("body", Kind::Text)]));
        registry
    }

    fn stores() -> ((ObjectStore, tempfile::TempDir), (ObjectStore, tempfile::TempDir)) {
        let exporter_dir = tempfile::tempdir().unwrap();
        let exporter_db = sled::Config::new().temporary(true).open().unwrap();
        let exporter_store = ObjectStore::open(exporter_dir.path(), &exporter_db).unwrap();

        let importer_dir = tempfile::tempdir().unwrap();
        let importer_db = sled::Config::new().temporary(true).open().unwrap();
        let importer_store = ObjectStore::open(importer_dir.path(), &importer_db).unwrap();

        ((exporter_store, exporter_dir), (importer_store, importer_dir))
    }

    #[test]
    fn full_sync_persists_accessible_note_into_importer_store() {
        let registry = registry();
        let ((exporter_store, _ed), (importer_store, _id)) = stores();

        let person: PersonId = ObjectHash::of(b"remote-person");
        let note = Object::new("Note", vec![("body", Value::Text("hello".into()))]);
        let note_recipe = registry.get("Note").unwrap();
        let note_bytes = encode(&note_recipe, &note).unwrap();
        let note_put = exporter_store.put(note_bytes.as_bytes()).unwrap();

        let access = Object::new(
            "Access",
            vec![
                ("target", Value::Reference(Reference::Object(note_put.hash))),
                ("persons", Value::Set(vec![Value::Reference(Reference::Object(person))])),
                ("groups", Value::Set(vec![])),
            ],
        );
        let access_recipe = registry.get("Access").unwrap();
        let access_bytes = encode(&access_recipe, &access).unwrap();
        let access_put = exporter_store.put(access_bytes.as_bytes()).unwrap();
        exporter_store.record_reference(&person, "Person", &access_put.hash).unwrap();

        let exporter = Exporter::new(&exporter_store, &registry, person, vec![], ExporterEvents::default());
        let importer = Importer::new(&importer_store, false);

        drive_round_trip(&exporter, &importer).unwrap();

        assert!(importer_store.exists(&note_put.hash));
        assert_eq!(importer_store.get(&note_put.hash).unwrap(), note_bytes.as_bytes());
    }

    #[test]
    fn full_sync_populates_importer_version_tree_for_versioned_root() {
        let registry = registry();
        registry.register(Recipe::new(
            "IdAccess",
            vec![
                FieldDef::new("target_id", Kind::RefId),
                FieldDef::new("persons", Kind::Set(Box::new(Kind::RefObject))),
                FieldDef::new("groups", Kind::Set(Box::new(Kind::RefObject))),
            ],
        ));
        let ((exporter_store, _ed), (importer_store, _id)) = stores();

        let person: PersonId = ObjectHash::of(b"remote-person");
        let profile = Object::new("Note", vec![("body", Value::Text("versioned".into()))]);
        let profile_recipe = registry.get("Note").unwrap();
        let profile_bytes = encode(&profile_recipe, &profile).unwrap();
        let profile_put = exporter_store.put(profile_bytes.as_bytes()).unwrap();

        let id_access = Object::new(
            "IdAccess",
            vec![
                ("target_id", Value::Reference(Reference::Id(profile_put.hash))),
                ("persons", Value::Set(vec![Value::Reference(Reference::Object(person))])),
                ("groups", Value::Set(vec![])),
            ],
        );
        let id_access_recipe = registry.get("IdAccess").unwrap();
        let id_access_bytes = encode(&id_access_recipe, &id_access).unwrap();
        let id_access_put = exporter_store.put(id_access_bytes.as_bytes()).unwrap();
        exporter_store.record_reference(&person, "Person", &id_access_put.hash).unwrap();

        let mut seed_tree = VersionTree::new();
        seed_tree
            .insert(VersionNode {
                hash: profile_put.hash,
                creation_time: 7,
                obj: profile_put.hash,
                predecessor_diff: vec![Op::Set(profile_put.hash)],
                previous: vec![],
            })
            .unwrap();
        let exporter_tree = Mutex::new(seed_tree);
        let importer_tree = Mutex::new(VersionTree::new());

        let exporter =
            Exporter::new(&exporter_store, &registry, person, vec![], ExporterEvents::default()).with_version_tree(&exporter_tree);
        let importer = Importer::new(&importer_store, false).with_version_tree(&importer_tree);

        drive_round_trip(&exporter, &importer).unwrap();

        assert!(importer_store.exists(&profile_put.hash));
        let node = importer_tree.lock().get(profile_put.hash).cloned().expect("version node synced");
        assert_eq!(node.creation_time, 7);
        assert!(matches!(node.predecessor_diff.as_slice(), [Op::Set(h)] if *h == profile_put.hash));
    }
}
