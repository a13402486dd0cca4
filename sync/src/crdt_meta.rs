//! Wire encoding for the object a `GET_CRDT_META_OBJECT` exchange carries:
//! a [`VersionNode`], serialized the same ad hoc JSON way `protocol.rs`
//! serializes `ChumMessage` rather than through the microdata codec, since
//! this is transport plumbing rather than a user-declared recipe (§4.7
//! "GET_CRDT_META_OBJECT (microdata) as appropriate to reference variant").

use crate::error::SyncError;
use glyphstore_codec::ObjectHash;
use glyphstore_crdt::{Op, VersionNode};
use serde_json::{json, Value};

fn op_to_json(op: &Op) -> Value {
    match op {
        Op::Set(hash) => json!({"op": "set", "value": hash.to_hex()}),
        Op::Delete => json!({"op": "delete"}),
    }
}

fn op_from_json(value: &Value) -> Result<Op, SyncError> {
    match value.get("op").and_then(Value::as_str) {
        Some("set") => Ok(Op::Set(hash_field(value, "value")?)),
        Some("delete") => Ok(Op::Delete),
        _ => Err(SyncError::Protocol("unknown crdt meta op".into())),
    }
}

fn hash_field(value: &Value, field: &str) -> Result<ObjectHash, SyncError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Protocol(format!("crdt meta object missing `{field}`")))?
        .parse()
        .map_err(|_| SyncError::Protocol(format!("crdt meta object has an invalid `{field}` hash")))
}

/// Encodes a version node as the bytes sent in reply to `GetCrdtMetaObject`.
pub fn encode(node: &VersionNode) -> Vec<u8> {
    json!({
        "hash": node.hash.to_hex(),
        "creationTime": node.creation_time,
        "obj": node.obj.to_hex(),
        "predecessorDiff": node.predecessor_diff.iter().map(op_to_json).collect::<Vec<_>>(),
        "previous": node.previous.iter().map(ObjectHash::to_hex).collect::<Vec<_>>(),
    })
    .to_string()
    .into_bytes()
}

/// Decodes bytes received from a `GetCrdtMetaObject` reply back into a
/// version node.
pub fn decode(bytes: &[u8]) -> Result<VersionNode, SyncError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|_| SyncError::Protocol("malformed crdt meta object".into()))?;
    let creation_time = value
        .get("creationTime")
        .and_then(Value::as_u64)
        .ok_or_else(|| SyncError::Protocol("crdt meta object missing `creationTime`".into()))?;
    let predecessor_diff = value
        .get("predecessorDiff")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::Protocol("crdt meta object missing `predecessorDiff`".into()))?
        .iter()
        .map(op_from_json)
        .collect::<Result<Vec<_>, _>>()?;
    let previous = value
        .get("previous")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::Protocol("crdt meta object missing `previous`".into()))?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| SyncError::Protocol("crdt meta object has a non-string `previous` entry".into()))?
                .parse()
                .map_err(|_| SyncError::Protocol("crdt meta object has an invalid `previous` hash".into()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(VersionNode {
        hash: hash_field(&value, "hash")?,
        creation_time,
        obj: hash_field(&value, "obj")?,
        predecessor_diff,
        previous,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_node_roundtrips() {
        let node = VersionNode {
            hash: ObjectHash::of(b"node"),
            creation_time: 42,
            obj: ObjectHash::of(b"obj"),
            predecessor_diff: vec![Op::Set(ObjectHash::of(b"value"))],
            previous: vec![ObjectHash::of(b"parent")],
        };
        let bytes = encode(&node);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.hash, node.hash);
        assert_eq!(decoded.creation_time, node.creation_time);
        assert_eq!(decoded.obj, node.obj);
        assert_eq!(decoded.previous, node.previous);
        assert!(matches!(decoded.predecessor_diff.as_slice(), [Op::Set(h)] if *h == ObjectHash::of(b"value")));
    }

    #[test]
    fn delete_node_with_no_previous_roundtrips() {
        let node = VersionNode {
            hash: ObjectHash::of(b"node"),
            creation_time: 0,
            obj: ObjectHash::of(b"obj"),
            predecessor_diff: vec![Op::Delete],
            previous: vec![],
        };
        let decoded = decode(&encode(&node)).unwrap();
        assert!(matches!(decoded.predecessor_diff.as_slice(), [Op::Delete]));
        assert!(decoded.previous.is_empty());
    }

    #[test]
    fn missing_field_is_a_protocol_error() {
        let bytes = json!({"hash": ObjectHash::of(b"n").to_hex()}).to_string().into_bytes();
        assert!(matches!(decode(&bytes), Err(SyncError::Protocol(_))));
    }
}
