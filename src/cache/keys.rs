//! Cache key construction.

use uuid::Uuid;

/// Namespace shared by every document metadata entry.
pub const DOCUMENT_KEY_PREFIX: &str = "document:";

/// Key under which a document's metadata is cached.
pub fn document_key(id: Uuid) -> String {
    format!("{DOCUMENT_KEY_PREFIX}{id}")
}
