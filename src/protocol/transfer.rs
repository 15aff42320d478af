use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::sftp::FileEntry;

use super::Envelope;

/// Browser → proxy requests after `connect` on a file-transfer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    /// An empty path lists the home directory
    List { path: String },
    Get { path: String },
    /// `data` is standard base64
    Put { path: String, data: String },
    /// Directory removal is tried first, then file removal
    Remove { path: String },
    Mkdir { path: String },
    Rename { from: String, to: String },
}

#[derive(Deserialize)]
struct PathPayload {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
struct PutPayload {
    path: String,
    data: String,
}

#[derive(Deserialize)]
struct RenamePayload {
    from: String,
    to: String,
}

impl TransferRequest {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope = Envelope::parse(text)?;
        let request = match envelope.kind.as_ref() {
            "ls" => {
                let PathPayload { path } = envelope.payload()?;
                TransferRequest::List { path }
            }
            "get" => {
                let PathPayload { path } = envelope.payload()?;
                TransferRequest::Get { path }
            }
            "put" => {
                let PutPayload { path, data } = envelope.payload()?;
                TransferRequest::Put { path, data }
            }
            "rm" => {
                let PathPayload { path } = envelope.payload()?;
                TransferRequest::Remove { path }
            }
            "mkdir" => {
                let PathPayload { path } = envelope.payload()?;
                TransferRequest::Mkdir { path }
            }
            "rename" => {
                let RenamePayload { from, to } = envelope.payload()?;
                TransferRequest::Rename { from, to }
            }
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(request)
    }
}

/// Which mutation a `done` acknowledges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DoneOp {
    Put { path: String },
    Rm { path: String },
    Mkdir { path: String },
    Rename { from: String, to: String },
}

/// Proxy → browser messages on a file-transfer stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TransferEvent {
    Connected {
        home: String,
        host_name: String,
    },
    LsResult {
        path: String,
        entries: Vec<FileEntry>,
    },
    GetResult {
        path: String,
        name: String,
        /// standard base64
        data: String,
    },
    Done(DoneOp),
    Error {
        message: String,
    },
}

impl TransferEvent {
    pub fn error(message: impl Into<String>) -> Self {
        TransferEvent::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_each_operation() {
        assert_eq!(
            TransferRequest::decode(r#"{"type":"ls","payload":{}}"#).unwrap(),
            TransferRequest::List {
                path: String::new()
            }
        );
        assert_eq!(
            TransferRequest::decode(r#"{"type":"get","payload":{"path":"/etc/hosts"}}"#).unwrap(),
            TransferRequest::Get {
                path: "/etc/hosts".into()
            }
        );
        assert_eq!(
            TransferRequest::decode(r#"{"type":"put","payload":{"path":"/tmp/a","data":"aGk="}}"#)
                .unwrap(),
            TransferRequest::Put {
                path: "/tmp/a".into(),
                data: "aGk=".into()
            }
        );
        assert_eq!(
            TransferRequest::decode(r#"{"type":"rm","payload":{"path":"/tmp/d"}}"#).unwrap(),
            TransferRequest::Remove {
                path: "/tmp/d".into()
            }
        );
        assert_eq!(
            TransferRequest::decode(r#"{"type":"rename","payload":{"from":"/a","to":"/b"}}"#)
                .unwrap(),
            TransferRequest::Rename {
                from: "/a".into(),
                to: "/b".into()
            }
        );
    }

    #[test]
    fn invalid_payload_names_operation() {
        match TransferRequest::decode(r#"{"type":"put","payload":{"path":"/tmp/a"}}"#) {
            Err(ProtocolError::InvalidPayload { kind, .. }) => assert_eq!(kind, "put"),
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
        assert_eq!(
            TransferRequest::decode(r#"{"type":"chmod","payload":{}}"#).unwrap_err(),
            ProtocolError::UnknownType("chmod".into())
        );
    }

    #[test]
    fn done_carries_op_tag() {
        let put = serde_json::to_value(TransferEvent::Done(DoneOp::Put {
            path: "/tmp/a".into(),
        }))
        .unwrap();
        assert_eq!(
            put,
            json!({"type": "done", "payload": {"op": "put", "path": "/tmp/a"}})
        );

        let rename = serde_json::to_value(TransferEvent::Done(DoneOp::Rename {
            from: "/a".into(),
            to: "/b".into(),
        }))
        .unwrap();
        assert_eq!(
            rename,
            json!({"type": "done", "payload": {"op": "rename", "from": "/a", "to": "/b"}})
        );
    }

    #[test]
    fn ls_result_type_is_snake_case() {
        let value = serde_json::to_value(TransferEvent::LsResult {
            path: "/".into(),
            entries: vec![FileEntry::new("etc".into(), 4096, Some(0o040755), Some(0))],
        })
        .unwrap();
        assert_eq!(value["type"], "ls_result");
        assert_eq!(value["payload"]["entries"][0]["mode"], "drwxr-xr-x");
        assert_eq!(value["payload"]["entries"][0]["is_dir"], true);
        assert_eq!(value["payload"]["entries"][0]["mod_time"], "1970-01-01T00:00:00Z");
    }
}
