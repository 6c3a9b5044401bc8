//! tokensync-core: foundation for the block and token-transfer ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//! SyncDriver (tokensync-evm)
//!     ├── BlockSync        (blocks + transactions → BLOCK / TX items)
//!     ├── TransferSync     (logs → TransferEvent → TRANSFER items)
//!     ├── WatermarkManager (MAX_BLOCK resume point)
//!     ├── PacingController (inter-block delay)
//!     └── KvStore backend  (memory / SQLite)
//! ```

pub mod compress;
pub mod config;
pub mod cursor;
pub mod error;
pub mod pacing;
pub mod record;
pub mod retry;
pub mod store;
pub mod types;
pub mod watermark;

pub use config::{PacingConfig, SyncConfig};
pub use cursor::Cursor;
pub use error::{StoreError, SyncError};
pub use pacing::{LagTracker, PacingController};
pub use retry::{retry_until_ok, FixedBackoff};
pub use store::{AttrValue, Item, KvStore, MAX_BATCH_ITEMS};
pub use types::{TokenMetadata, TokenType, TransferEvent, TransferType, TransferValue};
pub use watermark::WatermarkManager;
