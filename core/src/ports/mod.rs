//! External collaborator ports (§4.6 external interfaces). Each trait is a
//! seam the driver/dispatcher depend on; concrete adapters (a real bot
//! transport, a real headless browser, a real blob host) live in the binary
//! crate, following the teacher's `ProgressObserver` trait-at-the-boundary
//! style.

pub mod blob_uploader;
pub mod browser_pool;
pub mod messenger;

pub use blob_uploader::BlobUploader;
pub use browser_pool::{BrowserContext, BrowserPool, Fingerprint};
pub use messenger::{InputMedia, Messenger};
