mod data_url;
mod detectors;
mod fetch;
mod intercept;

pub use data_url::{decode as decode_data_url, DataUrl};
pub use detectors::{AttachmentElementDetector, DownloadLinkDetector, InlineImageDetector};
pub use fetch::{resolve_mime, AttachmentFetcher};
pub use intercept::{intercept_within, DetectOnlyInterceptor};

use std::collections::HashSet;

use scraper::Html;
use tracing::debug;
use url::Url;

use crate::core::{AttachmentDescriptor, AttachmentDetector};

/// Runs every detector over a page and merges their findings.
pub struct AttachmentLocator {
    detectors: Vec<Box<dyn AttachmentDetector>>,
}

impl AttachmentLocator {
    pub fn new() -> Self {
        Self {
            detectors: vec![
                Box::new(DownloadLinkDetector),
                Box::new(AttachmentElementDetector),
                Box::new(InlineImageDetector),
            ],
        }
    }

    pub fn with_detectors(detectors: Vec<Box<dyn AttachmentDetector>>) -> Self {
        Self { detectors }
    }

    /// Candidates in detector order, each file name yielded once.
    ///
    /// Detectors run lazily as the iterator advances, so taking only the
    /// first few candidates skips the remaining strategies.
    pub fn locate<'a>(
        &'a self,
        document: &'a Html,
        base: Option<&'a Url>,
    ) -> impl Iterator<Item = AttachmentDescriptor> + 'a {
        let mut seen = HashSet::new();
        self.detectors
            .iter()
            .flat_map(move |detector| {
                let found = detector.detect(document, base);
                debug!(detector = detector.name(), candidates = found.len(), "scanned page");
                found
            })
            .filter(move |candidate| seen.insert(candidate.file_name.clone()))
    }

    /// Parse `html` and collect every candidate.
    pub fn scan(&self, html: &str, base: Option<&Url>) -> Vec<AttachmentDescriptor> {
        let document = Html::parse_document(html);
        self.locate(&document, base).collect()
    }
}

impl Default for AttachmentLocator {
    fn default() -> Self {
        Self::new()
    }
}
