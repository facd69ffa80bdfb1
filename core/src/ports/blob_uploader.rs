//! The `BlobUploader` port (§4.6): uploading an oversized local file to an
//! external paste/blob host (e.g. when §7 `QuotaOrSizeError` means the
//! transport itself can't carry the file) and getting back a durable URL.

use async_trait::async_trait;

use crate::error::TransportError;

#[async_trait]
pub trait BlobUploader: Send + Sync + 'static {
    /// Upload `local_path`, returning the hosted URL. `special` in
    /// `HandleCacheEntry` records which host served it (e.g. `"catbox"`).
    async fn upload(&self, local_path: &str) -> Result<String, TransportError>;

    /// Identifier recorded alongside a cached URL handle.
    fn name(&self) -> &'static str;
}
