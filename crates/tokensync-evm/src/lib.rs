//! tokensync-evm: EVM transfer decoding and the block sync pipeline.
//!
//! ```text
//! SyncDriver
//!   ├── BlockSync      eth_getBlockByNumber → BLOCK + TX items
//!   ├── TransferSync   eth_getLogs → decode_log → TRANSFER items
//!   │     ├── TokenClassifier   (supportsInterface / bytecode probes)
//!   │     └── MetadataResolver  (name / symbol / decimals / totalSupply)
//!   └── CouncilPoller  kaia_getStakingInfo → GC_INFO item
//! ```

pub mod abi;
pub mod batch;
pub mod block_sync;
pub mod builder;
pub mod classifier;
pub mod council;
pub mod decoder;
pub mod driver;
pub mod metadata;
pub mod transfer_sync;

pub use block_sync::BlockSync;
pub use builder::SyncBuilder;
pub use classifier::TokenClassifier;
pub use council::CouncilPoller;
pub use decoder::{decode_log, DecodeError, LogContext};
pub use driver::SyncDriver;
pub use metadata::{MetadataError, MetadataResolver};
pub use transfer_sync::{TransferSync, TransferSyncOutcome};
