use std::io::Write;
use std::sync::Arc;

use tracing::{debug, warn};

use super::stream::ByteStream;
use super::{ArchiveEntryFilter, IdentityFilter, MergeBandsFilter, NodeFilter, RoiFilter, StreamFilter, TiffImageStreamFilter};
use crate::codec::{RegionDecoder, TiffRegionDecoder};
use crate::error::{ContentError, ContentResult};
use crate::node::ContentNode;
use crate::params::FilterParams;

/// Ordered filter lists. Built once at startup and shared read-only.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    node_filters: Vec<NodeFilter>,
    stream_filters: Vec<StreamFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self { Self::default() }

    /// Region, band merge, ZIP entry, TAR entry, then identity as the catch-all.
    pub fn with_defaults(decoder: Arc<dyn RegionDecoder>) -> Self {
        Self::new()
            .register(NodeFilter::RegionOfInterest(RoiFilter::new(decoder.clone())))
            .register(NodeFilter::MergeBands(MergeBandsFilter))
            .register(NodeFilter::ArchiveEntry(ArchiveEntryFilter::zip()))
            .register(NodeFilter::ArchiveEntry(ArchiveEntryFilter::tar()))
            .register(NodeFilter::Identity(IdentityFilter))
            .register_stream(StreamFilter::TiffImage(TiffImageStreamFilter::new(decoder)))
            .register_stream(StreamFilter::Identity)
    }

    /// Defaults backed by the TIFF region decoder.
    pub fn standard() -> Self {
        Self::with_defaults(Arc::new(TiffRegionDecoder::new()))
    }

    pub fn register(mut self, filter: NodeFilter) -> Self {
        if let Some(NodeFilter::Identity(_)) = self.node_filters.last() {
            warn!(target: "stowage::filter", filter = filter.name(), "registered after identity; it will never be selected");
        }
        self.node_filters.push(filter);
        self
    }

    pub fn register_stream(mut self, filter: StreamFilter) -> Self {
        if let Some(StreamFilter::Identity) = self.stream_filters.last() {
            warn!(target: "stowage::filter", filter = filter.name(), "registered after identity; it will never be selected");
        }
        self.stream_filters.push(filter);
        self
    }

    pub fn node_filters(&self) -> &[NodeFilter] { &self.node_filters }

    /// First registered node filter supporting `filter_type`; absent type means identity.
    pub fn node_filter(&self, filter_type: Option<&str>) -> ContentResult<&NodeFilter> {
        let ft = filter_type.unwrap_or("");
        let found = self.node_filters.iter().find(|f| f.supports(ft));
        match found {
            Some(f) => {
                debug!(target: "stowage::filter", requested = ft, selected = f.name(), "node filter selected");
                Ok(f)
            }
            None => Err(ContentError::UnsupportedFilterType(ft.to_string())),
        }
    }

    pub fn stream_filter(&self, filter_type: Option<&str>) -> ContentResult<&StreamFilter> {
        let ft = filter_type.unwrap_or("");
        self.stream_filters
            .iter()
            .find(|f| f.supports(ft))
            .ok_or_else(|| ContentError::UnsupportedFilterType(ft.to_string()))
    }

    pub fn apply_filter(&self, params: &FilterParams, nodes: &[ContentNode], out: &mut dyn Write) -> ContentResult<u64> {
        self.node_filter(params.filter_type())?.apply(params, nodes, out)
    }

    pub fn estimate_size(&self, params: &FilterParams, nodes: &[ContentNode]) -> ContentResult<u64> {
        self.node_filter(params.filter_type())?.estimate_size(params, nodes)
    }

    pub fn apply_stream_filter(&self, params: &FilterParams, src: ByteStream) -> ContentResult<ByteStream> {
        self.stream_filter(params.filter_type())?.apply(params, src)
    }
}
