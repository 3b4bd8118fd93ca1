//! Reset/import capability.

use crate::Result;

/// Media type of a JSON array of edges.
pub const MEDIA_TYPE_JSON: &str = "application/json";

/// How imported content combines with existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Drop existing content first.
    Replace,
    /// Keep existing content.
    Append,
}

/// Bulk loading from a byte payload tagged with a media type.
pub trait ImportCapability: Send + Sync {
    /// Media types this engine accepts.
    fn supported_media_types(&self) -> &[&'static str];

    /// Loads `payload`; returns the number of edges read.
    ///
    /// The import is all-or-nothing: on error the repository is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedMediaType`] or
    /// [`crate::Error::MalformedPayload`].
    fn import(&self, media_type: &str, payload: &[u8], mode: ImportMode) -> Result<usize>;
}
