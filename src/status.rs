//! Operation outcomes.
use std::collections::BTreeMap;

use crate::error::GnssError;

#[derive(Debug, Clone, PartialEq, Default)]
/// Outcome of a pipeline operation.
///
/// A status is successful exactly when it carries no error. Equality compares
/// the error and the metadata.
pub struct Status {
    /// Error, if the operation failed
    pub error: Option<GnssError>,
    /// Free form annotations
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Status {
    /// A successful status without metadata
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failed status
    pub fn err(error: GnssError) -> Self {
        Self {
            error: Some(error),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the operation succeeded
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<T> From<&Result<T, GnssError>> for Status {
    fn from(result: &Result<T, GnssError>) -> Self {
        match result {
            Ok(_) => Status::ok(),
            Err(e) => Status::err(e.clone()),
        }
    }
}
