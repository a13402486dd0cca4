use crate::error::SyncError;
use glyphstore_codec::ObjectHash;
use serde_json::{json, Value};

/// Numeric message tags, fixed by the wire protocol (§4.7, §6).
pub mod tag {
    pub const GET_PROTOCOL_VERSION: u8 = 1;
    pub const GET_ACCESSIBLE_ROOTS: u8 = 2;
    pub const NEW_ACCESSIBLE_ROOT_EVENT: u8 = 3;
    pub const GET_OBJECT_CHILDREN: u8 = 4;
    pub const GET_ID_OBJECT_CHILDREN: u8 = 5;
    pub const GET_OBJECT: u8 = 6;
    pub const GET_ID_OBJECT: u8 = 7;
    pub const GET_BLOB: u8 = 8;
    pub const GET_CRDT_META_OBJECT: u8 = 9;
    pub const FIN: u8 = 10;
    /// Not part of the numbered catalog in §4.7 but needed for responses
    /// and exporter-side failures; kept out of the 1..10 range so it can
    /// never collide with a future addition to the numbered set.
    pub const ERROR: u8 = 255;
}

/// The reference variant of a root or child hash, matching the codec's
/// `Reference` enum, so the importer knows which fetch (`GET_OBJECT` /
/// `GET_ID_OBJECT` / `GET_BLOB` / `GET_CRDT_META_OBJECT`) to issue
/// (§4.7 "as appropriate to reference variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RootKind {
    Object,
    Id,
    Blob,
    Clob,
}

impl RootKind {
    fn as_str(self) -> &'static str {
        match self {
            RootKind::Object => "object",
            RootKind::Id => "id",
            RootKind::Blob => "blob",
            RootKind::Clob => "clob",
        }
    }

    fn from_str(s: &str) -> Result<Self, SyncError> {
        match s {
            "object" => Ok(RootKind::Object),
            "id" => Ok(RootKind::Id),
            "blob" => Ok(RootKind::Blob),
            "clob" => Ok(RootKind::Clob),
            other => Err(SyncError::Protocol(format!("unknown root kind `{other}`"))),
        }
    }
}

impl From<glyphstore_codec::Reference> for RootRef {
    fn from(reference: glyphstore_codec::Reference) -> Self {
        let kind = match reference {
            glyphstore_codec::Reference::Object(_) => RootKind::Object,
            glyphstore_codec::Reference::Id(_) => RootKind::Id,
            glyphstore_codec::Reference::Blob(_) => RootKind::Blob,
            glyphstore_codec::Reference::Clob(_) => RootKind::Clob,
        };
        RootRef {
            hash: reference.hash(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RootRef {
    pub hash: ObjectHash,
    pub kind: RootKind,
}

fn hash_to_hex(h: &ObjectHash) -> String {
    h.to_hex()
}

fn hash_from_value(v: &Value) -> Result<ObjectHash, SyncError> {
    v.as_str()
        .ok_or_else(|| SyncError::Protocol("expected a hex hash string".into()))?
        .parse()
        .map_err(|_| SyncError::Protocol("invalid hash encoding".into()))
}

fn bytes_from_hex_value(v: &Value) -> Result<Vec<u8>, SyncError> {
    let s = v.as_str().ok_or_else(|| SyncError::Protocol("expected hex-encoded bytes".into()))?;
    hex::decode(s).map_err(|_| SyncError::Protocol("invalid hex encoding".into()))
}

/// One message of the Chum protocol, tagged numerically on the wire
/// (§4.7, §6). A single enum carries both importer requests and exporter
/// responses/pushes since the protocol is message-oriented rather than
/// strict request/reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ChumMessage {
    GetProtocolVersion,
    ProtocolVersion(u32),
    GetAccessibleRoots,
    AccessibleRoots(Vec<RootRef>),
    NewAccessibleRootEvent(RootRef),
    GetObjectChildren(ObjectHash),
    GetIdObjectChildren(ObjectHash),
    Children(Vec<RootRef>),
    GetObject(ObjectHash),
    GetIdObject(ObjectHash),
    GetBlob(ObjectHash),
    GetCrdtMetaObject(ObjectHash),
    ObjectBytes { hash: ObjectHash, bytes: Vec<u8> },
    Fin,
    Error(String),
}

impl ChumMessage {
    pub fn to_json(&self) -> Value {
        match self {
            ChumMessage::GetProtocolVersion => json!({"tag": tag::GET_PROTOCOL_VERSION}),
            ChumMessage::ProtocolVersion(v) => json!({"tag": tag::GET_PROTOCOL_VERSION, "version": v}),
            ChumMessage::GetAccessibleRoots => json!({"tag": tag::GET_ACCESSIBLE_ROOTS}),
            ChumMessage::AccessibleRoots(roots) => json!({
                "tag": tag::GET_ACCESSIBLE_ROOTS,
                "roots": roots.iter().map(root_to_json).collect::<Vec<_>>(),
            }),
            ChumMessage::NewAccessibleRootEvent(root) => json!({
                "tag": tag::NEW_ACCESSIBLE_ROOT_EVENT,
                "root": root_to_json(root),
            }),
            ChumMessage::GetObjectChildren(h) => json!({"tag": tag::GET_OBJECT_CHILDREN, "hash": hash_to_hex(h)}),
            ChumMessage::GetIdObjectChildren(h) => json!({"tag": tag::GET_ID_OBJECT_CHILDREN, "hash": hash_to_hex(h)}),
            ChumMessage::Children(children) => json!({
                "tag": tag::GET_OBJECT_CHILDREN,
                "children": children.iter().map(root_to_json).collect::<Vec<_>>(),
            }),
            ChumMessage::GetObject(h) => json!({"tag": tag::GET_OBJECT, "hash": hash_to_hex(h)}),
            ChumMessage::GetIdObject(h) => json!({"tag": tag::GET_ID_OBJECT, "hash": hash_to_hex(h)}),
            ChumMessage::GetBlob(h) => json!({"tag": tag::GET_BLOB, "hash": hash_to_hex(h)}),
            ChumMessage::GetCrdtMetaObject(h) => json!({"tag": tag::GET_CRDT_META_OBJECT, "hash": hash_to_hex(h)}),
            ChumMessage::ObjectBytes { hash, bytes } => json!({
                "tag": tag::GET_OBJECT,
                "hash": hash_to_hex(hash),
                "bytes": hex::encode(bytes),
            }),
            ChumMessage::Fin => json!({"tag": tag::FIN}),
            ChumMessage::Error(message) => json!({"tag": tag::ERROR, "message": message}),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, SyncError> {
        let tag = value
            .get("tag")
            .and_then(Value::as_u64)
            .ok_or_else(|| SyncError::Protocol("message missing numeric `tag`".into()))?;
        match tag as u8 {
            tag::GET_PROTOCOL_VERSION => match value.get("version") {
                Some(v) => Ok(ChumMessage::ProtocolVersion(
                    v.as_u64().ok_or_else(|| SyncError::Protocol("version must be an integer".into()))? as u32,
                )),
                None => Ok(ChumMessage::GetProtocolVersion),
            },
            tag::GET_ACCESSIBLE_ROOTS => match value.get("roots") {
                Some(Value::Array(items)) => {
                    let roots = items.iter().map(root_from_json).collect::<Result<Vec<_>, _>>()?;
                    Ok(ChumMessage::AccessibleRoots(roots))
                }
                _ => Ok(ChumMessage::GetAccessibleRoots),
            },
            tag::NEW_ACCESSIBLE_ROOT_EVENT => {
                let root = value
                    .get("root")
                    .ok_or_else(|| SyncError::Protocol("missing `root`".into()))?;
                Ok(ChumMessage::NewAccessibleRootEvent(root_from_json(root)?))
            }
            tag::GET_OBJECT_CHILDREN => match value.get("children") {
                Some(Value::Array(items)) => {
                    let children = items.iter().map(root_from_json).collect::<Result<Vec<_>, _>>()?;
                    Ok(ChumMessage::Children(children))
                }
                _ => Ok(ChumMessage::GetObjectChildren(hash_from_value(
                    value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?,
                )?)),
            },
            tag::GET_ID_OBJECT_CHILDREN => Ok(ChumMessage::GetIdObjectChildren(hash_from_value(
                value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?,
            )?)),
            tag::GET_OBJECT => match value.get("bytes") {
                Some(bytes_value) => Ok(ChumMessage::ObjectBytes {
                    hash: hash_from_value(value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?)?,
                    bytes: bytes_from_hex_value(bytes_value)?,
                }),
                None => Ok(ChumMessage::GetObject(hash_from_value(
                    value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?,
                )?)),
            },
            tag::GET_ID_OBJECT => Ok(ChumMessage::GetIdObject(hash_from_value(
                value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?,
            )?)),
            tag::GET_BLOB => Ok(ChumMessage::GetBlob(hash_from_value(
                value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?,
            )?)),
            tag::GET_CRDT_META_OBJECT => Ok(ChumMessage::GetCrdtMetaObject(hash_from_value(
                value.get("hash").ok_or_else(|| SyncError::Protocol("missing `hash`".into()))?,
            )?)),
            tag::FIN => Ok(ChumMessage::Fin),
            tag::ERROR => Ok(ChumMessage::Error(
                value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            )),
            other => Err(SyncError::Protocol(format!("unknown message tag {other}"))),
        }
    }
}

fn root_to_json(root: &RootRef) -> Value {
    json!({"hash": hash_to_hex(&root.hash), "kind": root.kind.as_str()})
}

fn root_from_json(value: &Value) -> Result<RootRef, SyncError> {
    let hash = hash_from_value(value.get("hash").ok_or_else(|| SyncError::Protocol("root missing `hash`".into()))?)?;
    let kind = RootKind::from_str(
        value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Protocol("root missing `kind`".into()))?,
    )?;
    Ok(RootRef { hash, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_version_request_and_reply_roundtrip() {
        let request = ChumMessage::GetProtocolVersion;
        let decoded = ChumMessage::from_json(&request.to_json()).unwrap();
        assert_eq!(decoded, request);

        let reply = ChumMessage::ProtocolVersion(3);
        let decoded_reply = ChumMessage::from_json(&reply.to_json()).unwrap();
        assert_eq!(decoded_reply, reply);
    }

    #[test]
    fn accessible_roots_roundtrip() {
        let root = RootRef {
            hash: ObjectHash::of(b"root"),
            kind: RootKind::Id,
        };
        let msg = ChumMessage::AccessibleRoots(vec![root]);
        let decoded = ChumMessage::from_json(&msg.to_json()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let value = json!({"tag": 200});
        assert!(matches!(ChumMessage::from_json(&value), Err(SyncError::Protocol(_))));
    }
}
