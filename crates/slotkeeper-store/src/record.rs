use crate::persistence::StoredRecord;
use crate::StoreError;
use serde::{Deserialize, Serialize};

/// On-disk envelope of a single record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecordFile {
    pub revision: u64,
    /// blake3 over the revision and the canonical body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub body: serde_json::Value,
}

impl RecordFile {
    pub fn new(revision: u64, body: serde_json::Value) -> Result<Self, StoreError> {
        let mut file = Self {
            revision,
            checksum: None,
            body,
        };
        file.checksum = Some(file.compute_checksum()?);
        Ok(file)
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let canonical = serde_json::to_string(&self.body)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.revision.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Parse an envelope and verify its checksum. `name` is used in errors.
    pub fn parse(name: &str, content: &str) -> Result<Self, StoreError> {
        let file: RecordFile = serde_json::from_str(content)?;
        if let Some(ref expected) = file.checksum {
            let actual = file.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    record: name.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(file)
    }

    pub fn into_stored(self, id: &str) -> StoredRecord {
        StoredRecord {
            id: id.to_owned(),
            revision: self.revision,
            body: self.body,
        }
    }
}

/// Record ids become file names, so they are restricted to `[a-zA-Z0-9_-]`.
pub fn validate_record_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.len() > 128 {
        return Err(StoreError::InvalidId(format!(
            "'{id}': record id must be 1-128 characters"
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(StoreError::InvalidId(format!(
            "'{id}': record id must match [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}
