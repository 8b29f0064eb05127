//! Entry points exposed to request handlers.
//!
//! The pipeline itself is blocking I/O; the `*_async` variants move it onto the
//! tokio blocking pool so handlers on the async runtime never stall a worker.

use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::{debug, info, info_span};

use crate::codec::tiff_stack::{read_metadata_from, TiffMetadata};
use crate::correlation::CorrelationId;
use crate::error::{ContentError, ContentResult};
use crate::filters::stream::ByteStream;
use crate::filters::FilterRegistry;
use crate::idgen::{shard_path, IdGenerator, Identifier};
use crate::node::ContentNode;
use crate::params::FilterParams;
use crate::resolver::PathResolver;

#[derive(Debug, Clone)]
pub struct ContentService {
    registry: Arc<FilterRegistry>,
    ids: Arc<IdGenerator>,
}

fn join_error(e: tokio::task::JoinError) -> ContentError {
    ContentError::ContentFilter(io::Error::new(io::ErrorKind::Other, e))
}

impl ContentService {
    pub fn new(registry: Arc<FilterRegistry>, ids: Arc<IdGenerator>) -> Self {
        Self { registry, ids }
    }

    pub fn registry(&self) -> &FilterRegistry { &self.registry }
    pub fn ids(&self) -> &Arc<IdGenerator> { &self.ids }

    /// Stream the filtered content of `nodes` into `out`; returns bytes written.
    pub fn apply_filter(&self, params: &FilterParams, nodes: &[ContentNode], out: &mut dyn Write) -> ContentResult<u64> {
        let cid = CorrelationId::new();
        let span = info_span!(target: "stowage::filter", "apply_filter", correlation_id = %cid, filter = params.filter_type().unwrap_or(""), nodes = nodes.len());
        let _guard = span.enter();
        let n = self.registry.apply_filter(params, nodes, out)?;
        info!(target: "stowage::filter", bytes = n, "content streamed");
        Ok(n)
    }

    /// Expected output size, 0 when unknown or when the client disabled estimation.
    pub fn estimate_size(&self, params: &FilterParams, nodes: &[ContentNode]) -> ContentResult<u64> {
        if params.estimate_size_disabled() {
            return Ok(0);
        }
        let cid = CorrelationId::new();
        let span = info_span!(target: "stowage::filter", "estimate_size", correlation_id = %cid, filter = params.filter_type().unwrap_or(""), nodes = nodes.len());
        let _guard = span.enter();
        let size = self.registry.estimate_size(params, nodes)?;
        debug!(target: "stowage::filter", size, "size estimated");
        Ok(size)
    }

    pub fn stream_filter(&self, params: &FilterParams, src: ByteStream) -> ContentResult<ByteStream> {
        self.registry.apply_stream_filter(params, src)
    }

    /// Resolve `path` and stream the filtered result.
    pub fn serve(
        &self,
        resolver: &dyn PathResolver,
        path: &str,
        params: &FilterParams,
        out: &mut dyn Write,
    ) -> ContentResult<u64> {
        let nodes = resolver.resolve(path, params)?;
        self.apply_filter(params, &nodes, out)
    }

    /// Stack geometry of a TIFF node, read from its page directories.
    pub fn tiff_metadata(&self, node: &ContentNode) -> ContentResult<TiffMetadata> {
        let meta = node.with_source(read_metadata_from)?;
        debug!(target: "stowage::filter", key = %node.object_key(), size = meta.size(), "tiff metadata read");
        Ok(meta)
    }

    pub fn next_id(&self) -> Identifier { self.ids.next() }

    pub fn next_ids(&self, n: usize) -> Vec<Identifier> { self.ids.next_batch(n) }

    pub fn shard_path(&self, id: &str) -> Vec<String> { shard_path(id) }

    /// [`Self::apply_filter`] on the blocking pool; the sink is handed back when done.
    pub async fn apply_filter_async<W>(&self, params: FilterParams, nodes: Vec<ContentNode>, mut out: W) -> ContentResult<(u64, W)>
    where
        W: Write + Send + 'static,
    {
        let svc = self.clone();
        tokio::task::spawn_blocking(move || {
            let n = svc.apply_filter(&params, &nodes, &mut out)?;
            Ok((n, out))
        })
        .await
        .map_err(join_error)?
    }

    pub async fn estimate_size_async(&self, params: FilterParams, nodes: Vec<ContentNode>) -> ContentResult<u64> {
        let svc = self.clone();
        tokio::task::spawn_blocking(move || svc.estimate_size(&params, &nodes))
            .await
            .map_err(join_error)?
    }

    /// Apply the selected stream filter and drain the result into memory.
    pub async fn stream_filter_async(&self, params: FilterParams, src: ByteStream) -> ContentResult<Vec<u8>> {
        let svc = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut filtered = svc.stream_filter(&params, src)?;
            let mut buf = Vec::new();
            filtered.read_to_end(&mut buf)?;
            Ok(buf)
        })
        .await
        .map_err(join_error)?
    }
}
