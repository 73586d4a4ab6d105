use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Suffix of the entry holding a state's advisory lock record.
const LOCK_SUFFIX: &str = "-lock";

/// JSON field identifying the lock holder.
const ID_FIELD: &str = "ID";

/// Get the store name of the lock record guarding `state`.
pub fn lock_name(state: &str) -> String {
    format!("{}{}", state, LOCK_SUFFIX)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockRecordError {
    #[error("Lock record is not a JSON object: {0}")]
    Malformed(String),

    #[error("Lock record has no string \"ID\" field")]
    MissingId,
}

/// An advisory lock record.
///
/// Only the `ID` field is interpreted. The raw bytes are kept untouched so
/// the record can be echoed back verbatim in conflict responses (Terraform
/// shows the holder's `Who`, `Operation`, `Created`... from them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    id: Option<String>,
    raw: Bytes,
}

impl LockRecord {
    /// Parse a stored lock record.
    ///
    /// The record must be a JSON object. A missing or non-string `ID` is
    /// accepted here but never matches any supplied ID.
    pub fn parse(raw: impl Into<Bytes>) -> Result<Self, LockRecordError> {
        let raw = raw.into();
        let fields: Map<String, Value> = serde_json::from_slice(&raw)
            .map_err(|e| LockRecordError::Malformed(e.to_string()))?;

        let id = match fields.get(ID_FIELD) {
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        };

        Ok(Self { id, raw })
    }

    /// Parse a lock record presented by a client, which must carry a string `ID`.
    pub fn parse_request(raw: impl Into<Bytes>) -> Result<Self, LockRecordError> {
        let record = Self::parse(raw)?;
        if record.id.is_none() {
            return Err(LockRecordError::MissingId);
        }
        Ok(record)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_raw(self) -> Bytes {
        self.raw
    }

    /// Exact string comparison, no coercion. `None` on either side never matches.
    pub fn is_held_by(&self, supplied: Option<&str>) -> bool {
        match (self.id.as_deref(), supplied) {
            (Some(held), Some(supplied)) => held == supplied,
            _ => false,
        }
    }
}

/// Outcome of checking a caller's lock ID against the stored lock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCheck {
    /// The caller holds the lock.
    Proceed,
    /// Someone else holds the lock.
    Blocked(LockRecord),
    /// There is no lock record to validate against.
    Unlocked,
}
