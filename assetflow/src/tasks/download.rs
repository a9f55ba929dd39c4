//! Fetch, verify and unpack as one composed stage.

use super::{ExtractArchiveStage, FetchStage, VerifyDigestStage};
use crate::collaborators::{ArchiveReader, Collaborator, HttpFetcher};
use crate::pipeline::Sequence;
use std::sync::Arc;

/// What to download and what to do with it afterwards.
pub struct DownloadOptions {
    name: String,
    url: String,
    target: String,
    fetcher: Option<Arc<dyn HttpFetcher>>,
    checksum: Option<String>,
    unzip: bool,
    extract_to: Option<String>,
    reader: Option<Collaborator<dyn ArchiveReader>>,
}

impl DownloadOptions {
    /// Downloads `url` to `target`; `name` prefixes the generated stage names.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        target: impl Into<String>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Self {
        Self {
            fetcher: Some(fetcher),
            ..Self::configured(name, url, target)
        }
    }

    /// Like [`DownloadOptions::new`], fetching with the run's configured fetcher.
    #[must_use]
    pub fn configured(name: impl Into<String>, url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            target: target.into(),
            fetcher: None,
            checksum: None,
            unzip: false,
            extract_to: None,
            reader: None,
        }
    }

    /// Verifies the download against a hex digest before anything else runs.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Extracts the download and drops the archive from the snapshot.
    #[must_use]
    pub fn unzip(mut self) -> Self {
        self.unzip = true;
        self
    }

    /// Extracts under `prefix` rather than the snapshot root.
    #[must_use]
    pub fn with_extract_to(mut self, prefix: impl Into<String>) -> Self {
        self.extract_to = Some(prefix.into());
        self
    }

    /// Uses `reader` for extraction instead of the in-process tar reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Collaborator<dyn ArchiveReader>) -> Self {
        self.reader = Some(reader);
        self
    }
}

impl std::fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("target", &self.target)
            .field("checksum", &self.checksum)
            .field("unzip", &self.unzip)
            .finish_non_exhaustive()
    }
}

/// Builds the `fetch -> verify -> extract` sequence described by `options`.
///
/// Verification runs only with a checksum and extraction only with
/// `unzip`, so a bad download fails before it is unpacked.
#[must_use]
pub fn download(options: DownloadOptions) -> Sequence {
    let DownloadOptions {
        name,
        url,
        target,
        fetcher,
        checksum,
        unzip,
        extract_to,
        reader,
    } = options;

    let fetch = match fetcher {
        Some(fetcher) => FetchStage::new(url, target.clone(), fetcher),
        None => FetchStage::configured(url, target.clone()),
    };
    let mut sequence = Sequence::new(name.clone()).then(Arc::new(fetch.with_name(format!("{name}:fetch"))));

    if let Some(checksum) = checksum {
        sequence = sequence.then(Arc::new(
            VerifyDigestStage::new(target.clone(), checksum).with_name(format!("{name}:verify")),
        ));
    }

    if unzip {
        let mut extract = ExtractArchiveStage::new(target)
            .with_name(format!("{name}:extract"))
            .removing_archive();
        if let Some(prefix) = extract_to {
            extract = extract.with_prefix(prefix);
        }
        if let Some(reader) = reader {
            extract = extract.with_reader(reader);
        }
        sequence = sequence.then(Arc::new(extract));
    }

    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockHttpFetcher;
    use crate::stages::Stage;

    fn idle_fetcher() -> Arc<dyn HttpFetcher> {
        Arc::new(MockHttpFetcher::new())
    }

    fn stage_names(sequence: &Sequence) -> Vec<String> {
        sequence.stages().iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn test_fetch_only() {
        let sequence = download(DownloadOptions::new(
            "jquery",
            "https://example.com/jquery.js",
            "jquery.js",
            idle_fetcher(),
        ));
        assert_eq!(sequence.name(), "jquery");
        assert_eq!(stage_names(&sequence), vec!["jquery:fetch"]);
    }

    #[test]
    fn test_full_chain_order() {
        let sequence = download(
            DownloadOptions::new("lib", "https://example.com/lib.zip", "lib.zip", idle_fetcher())
                .with_checksum("900150983cd24fb0d6963f7d28e17f72")
                .unzip(),
        );
        assert_eq!(
            stage_names(&sequence),
            vec!["lib:fetch", "lib:verify", "lib:extract"]
        );
    }

    #[test]
    fn test_unzip_without_checksum() {
        let sequence = download(
            DownloadOptions::new("lib", "https://example.com/lib.tgz", "lib.tgz", idle_fetcher())
                .unzip()
                .with_extract_to("vendor"),
        );
        assert_eq!(stage_names(&sequence), vec!["lib:fetch", "lib:extract"]);
    }
}
