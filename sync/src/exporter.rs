use crate::crdt_meta;
use crate::error::SyncError;
use crate::protocol::{ChumMessage, RootKind, RootRef};
use glyphstore_access::{GroupId, PersonId};
use glyphstore_codec::{ObjectHash, Reference, RecipeRegistry, Value};
use glyphstore_crdt::VersionTree;
use glyphstore_store::ObjectStore;
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// §6 "Protocol version is an integer; current = 8 in the reference
/// implementation."
pub const PROTOCOL_VERSION: u32 = 8;

/// Optional per-object notification hooks (§4.7 "Emits per-object events
/// (`onBlobSent`, `onClobSent`, `onObjectSent`, `onIdObjectSent`) and
/// `onError` (non-fatal by default)").
#[derive(Default)]
pub struct ExporterEvents {
    pub on_object_sent: Option<Box<dyn Fn(ObjectHash) + Send + Sync>>,
    pub on_id_object_sent: Option<Box<dyn Fn(ObjectHash) + Send + Sync>>,
    pub on_blob_sent: Option<Box<dyn Fn(ObjectHash) + Send + Sync>>,
    pub on_clob_sent: Option<Box<dyn Fn(ObjectHash) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(&SyncError) + Send + Sync>>,
}

fn access_target(obj: &glyphstore_codec::Object) -> Option<RootRef> {
    if let Some(access) = glyphstore_access::access_from_object(obj) {
        return Some(RootRef {
            hash: access.target,
            kind: RootKind::Object,
        });
    }
    if let Some(id_access) = glyphstore_access::id_access_from_object(obj) {
        return Some(RootRef {
            hash: id_access.target_id,
            kind: RootKind::Id,
        });
    }
    None
}

/// The responder side of the Chum protocol: answers an importer's queries
/// against the local store, scoped to what `remote_person` (directly, or
/// through `remote_groups`) is granted (§4.7 Exporter).
pub struct Exporter<'a> {
    store: &'a ObjectStore,
    registry: &'a RecipeRegistry,
    remote_person: PersonId,
    remote_groups: Vec<GroupId>,
    completed: Mutex<BTreeSet<ObjectHash>>,
    events: ExporterEvents,
    version_tree: Option<&'a Mutex<VersionTree>>,
}

impl<'a> Exporter<'a> {
    pub fn new(
        store: &'a ObjectStore,
        registry: &'a RecipeRegistry,
        remote_person: PersonId,
        remote_groups: Vec<GroupId>,
        events: ExporterEvents,
    ) -> Self {
        Self {
            store,
            registry,
            remote_person,
            remote_groups,
            completed: Mutex::new(BTreeSet::new()),
            events,
            version_tree: None,
        }
    }

    /// Gives the exporter a version tree to answer `GetCrdtMetaObject`
    /// from (§4.2, §4.7).
    pub fn with_version_tree(mut self, version_tree: &'a Mutex<VersionTree>) -> Self {
        self.version_tree = Some(version_tree);
        self
    }

    /// Scans reverse maps from `remote_person` backwards to Access/IdAccess
    /// objects, directly or through any of `remote_groups`, and resolves
    /// each to its granted target (§4.7 Exporter; §4.8).
    pub fn accessible_roots(&self) -> Result<Vec<RootRef>, SyncError> {
        let mut candidates: BTreeSet<ObjectHash> = self.store.reverse_map(&self.remote_person, "Person")?.into_iter().collect();
        for group in &self.remote_groups {
            candidates.extend(self.store.reverse_map(group, "Group")?);
        }

        let mut roots = BTreeSet::new();
        for candidate in candidates {
            let bytes = match self.store.get(&candidate) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            let Ok(text) = std::str::from_utf8(&bytes) else { continue };
            let Ok(obj) = glyphstore_codec::decode(self.registry, text) else { continue };
            if let Some(root) = access_target(&obj) {
                roots.insert(root);
            }
        }
        Ok(roots.into_iter().collect())
    }

    /// Enumerates child references of a stored object via the codec's
    /// link-finder (§4.7 step 3 "Enumerate child references via the
    /// codec's link-finder").
    fn children_of(&self, hash: ObjectHash) -> Result<Vec<RootRef>, SyncError> {
        let bytes = self.store.get(&hash).map_err(|_| SyncError::NotFound(hash))?;
        let text = std::str::from_utf8(&bytes).map_err(|_| SyncError::Protocol("stored object is not UTF-8".into()))?;
        let obj = glyphstore_codec::decode(self.registry, text)?;
        Ok(obj.collect_references().into_iter().map(RootRef::from).collect())
    }

    fn mark_completed(&self, hash: ObjectHash) -> bool {
        self.completed.lock().insert(hash)
    }

    fn already_completed(&self, hash: ObjectHash) -> bool {
        self.completed.lock().contains(&hash)
    }

    /// Answers one importer request (§4.7 Exporter). At-most-once: a
    /// re-request for an already-completed hash is still served from local
    /// storage (idempotent), but is not re-counted as a fresh send for
    /// event-notification purposes.
    pub fn answer(&self, request: &ChumMessage) -> ChumMessage {
        match request {
            ChumMessage::GetProtocolVersion => ChumMessage::ProtocolVersion(PROTOCOL_VERSION),
            ChumMessage::GetAccessibleRoots => match self.accessible_roots() {
                Ok(roots) => ChumMessage::AccessibleRoots(roots),
                Err(err) => self.report_error(err),
            },
            ChumMessage::GetObjectChildren(hash) | ChumMessage::GetIdObjectChildren(hash) => {
                match self.children_of(*hash) {
                    Ok(children) => ChumMessage::Children(children),
                    Err(err) => self.report_error(err),
                }
            }
            ChumMessage::GetObject(hash) | ChumMessage::GetIdObject(hash) => self.send_object(*hash),
            ChumMessage::GetCrdtMetaObject(hash) => self.send_crdt_meta(*hash),
            ChumMessage::GetBlob(hash) => self.send_object(*hash),
            ChumMessage::Fin => ChumMessage::Fin,
            other => ChumMessage::Error(format!("exporter cannot answer {other:?}")),
        }
    }

    fn send_object(&self, hash: ObjectHash) -> ChumMessage {
        match self.store.get(&hash) {
            Ok(bytes) => {
                let first_send = self.mark_completed(hash);
                if first_send {
                    self.notify_sent(hash);
                }
                ChumMessage::ObjectBytes { hash, bytes }
            }
            Err(_) => self.report_error(SyncError::NotFound(hash)),
        }
    }

    /// Answers `GetCrdtMetaObject` from the local version tree, if one was
    /// configured. Reported as a (non-fatal) error when absent rather than
    /// falling back to raw content, since the two are different things on
    /// the wire (§4.7 "GET_CRDT_META_OBJECT ... as appropriate to reference
    /// variant").
    fn send_crdt_meta(&self, hash: ObjectHash) -> ChumMessage {
        let Some(version_tree) = self.version_tree else {
            return self.report_error(SyncError::NotFound(hash));
        };
        let tree = version_tree.lock();
        let Some(node) = tree.get(hash) else {
            return self.report_error(SyncError::NotFound(hash));
        };
        ChumMessage::ObjectBytes {
            hash,
            bytes: crdt_meta::encode(node),
        }
    }

    fn notify_sent(&self, hash: ObjectHash) {
        if let Some(cb) = &self.events.on_object_sent {
            cb(hash);
        }
    }

    fn report_error(&self, err: SyncError) -> ChumMessage {
        if let Some(cb) = &self.events.on_error {
            cb(&err);
        }
        ChumMessage::Error(err.to_string())
    }

    pub fn is_completed(&self, hash: ObjectHash) -> bool {
        self.already_completed(hash)
    }
}
