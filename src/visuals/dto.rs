use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::Category;

#[derive(Debug, Default, Deserialize)]
pub struct OrphanParams {
    pub category: Option<String>,
}

/// A record whose blob is gone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingObject {
    pub id: Uuid,
    pub title: String,
    pub media_key: String,
}

/// Divergence between the visuals records and the blob directory. Records win;
/// nothing here is deleted automatically.
#[derive(Debug, Serialize)]
pub struct OrphanReport {
    pub category: Option<Category>,
    pub orphaned_objects: Vec<String>,
    pub missing_objects: Vec<MissingObject>,
}
