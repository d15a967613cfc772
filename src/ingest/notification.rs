//! Queue-message envelope parsing.
//!
//! The queue delivers either the S3 event shape (`{"Records":[...]}`)
//! or the EventBridge shape (`{"detail":{...}}`). Anything else is a
//! permanent drop; there is no point redelivering a body we will never
//! understand.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub size: Option<i64>,
    pub etag: Option<String>,
}

#[derive(Debug)]
pub enum NotificationError {
    UnknownShape,
}

impl std::fmt::Display for NotificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationError::UnknownShape => write!(f, "unrecognized notification shape"),
        }
    }
}

#[derive(Deserialize)]
struct S3EventEnvelope {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
    #[serde(rename = "eventName", default)]
    event_name: Option<String>,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: BucketRef,
    object: ObjectEntity,
}

#[derive(Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Deserialize)]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default, rename = "eTag", alias = "etag")]
    etag: Option<String>,
}

#[derive(Deserialize)]
struct EventBridgeEnvelope {
    detail: S3Entity,
}

/// Parse a queue-message body into the object references it names.
pub fn parse_notification(body: &str) -> Result<Vec<ObjectRef>, NotificationError> {
    if let Ok(envelope) = serde_json::from_str::<S3EventEnvelope>(body) {
        let objects: Vec<ObjectRef> = envelope
            .records
            .into_iter()
            .filter(|record| {
                record
                    .event_name
                    .as_deref()
                    .map(|name| name.starts_with("ObjectCreated"))
                    .unwrap_or(true)
            })
            .map(|record| object_ref(record.s3))
            .collect();
        if !objects.is_empty() {
            return Ok(objects);
        }
        // A valid envelope carrying only non-creation events is not an
        // unknown shape; it is simply empty work.
        return Ok(Vec::new());
    }

    if let Ok(envelope) = serde_json::from_str::<EventBridgeEnvelope>(body) {
        return Ok(vec![object_ref(envelope.detail)]);
    }

    Err(NotificationError::UnknownShape)
}

fn object_ref(entity: S3Entity) -> ObjectRef {
    // S3 event keys arrive URL-encoded, with spaces as '+'.
    let plus_decoded = entity.object.key.replace('+', " ");
    let key = match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    };
    ObjectRef {
        bucket: entity.bucket.name,
        key,
        size: entity.object.size,
        etag: entity.object.etag,
    }
}
