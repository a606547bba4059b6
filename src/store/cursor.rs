use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FieldValue, StoreError};

/// Opaque keyset position: the last row's sort value and id, tagged with the
/// fingerprint of the query that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    q: String,
    v: FieldValue,
    id: Uuid,
}

impl Cursor {
    pub fn new(fingerprint: String, value: FieldValue, id: Uuid) -> Self {
        Self {
            q: fingerprint,
            v: value,
            id,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.q
    }

    pub fn value(&self) -> &FieldValue {
        &self.v
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn encode(&self) -> String {
        // Serializing plain data into a Vec cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| StoreError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StoreError::InvalidCursor)
    }
}
