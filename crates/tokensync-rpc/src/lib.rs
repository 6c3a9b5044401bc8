//! tokensync-rpc: node access for the sync pipeline.
//!
//! - [`transport::RpcTransport`]: object-safe JSON-RPC transport trait
//! - [`client::HttpRpcClient`]: `reqwest` transport with per-request retry
//! - [`mock::MockTransport`]: scripted in-memory transport for tests
//! - [`node::NodeClient`]: typed wrappers for the node methods the pipeline uses

pub mod client;
pub mod error;
pub mod mock;
pub mod node;
pub mod policy;
pub mod request;
pub mod transport;

pub use client::{HttpClientConfig, HttpRpcClient};
pub use error::TransportError;
pub use mock::MockTransport;
pub use node::{
    parse_quantity, quantity, NodeClient, RawBlock, RawLog, RawTransaction, TransactionReceipt,
};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
