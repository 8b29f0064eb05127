//! Content resolution and streaming pipeline.
//!
//! Resolved content nodes are passed through a filter selected by the client's
//! `filterType` tag, then streamed directly (one node) or as a tar archive (many
//! nodes). Output sizes can be estimated without materializing the stream.
//! Stored content is addressed by time-based identifiers and sharded on disk by
//! their trailing digits.

pub mod archive;
pub mod bundle;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod filters;
pub mod idgen;
pub mod node;
pub mod params;
pub mod resolver;
pub mod service;
pub mod transfer;

pub use error::{AppError, ContentError, ContentResult};
pub use filters::{FilterRegistry, NodeFilter, StreamFilter};
pub use idgen::{shard_path, IdGenerator, Identifier};
pub use node::ContentNode;
pub use params::FilterParams;
pub use resolver::{FsResolver, PathResolver};
pub use service::ContentService;
pub use transfer::{ChecksumAlgorithm, ContentStore, TransferInfo};
