pub mod frame;
pub mod types;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;

use self::frame::PriceTable;
use self::types::DownloadRequest;

/// External bulk-download routine.
///
/// Takes a validated request and returns the aligned table, or an error
/// whose message is reported to the caller verbatim. Implementations own
/// any threading, adjustment and period/date precedence rules.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, request: &DownloadRequest) -> Result<PriceTable>;

    /// Source name reported in response metadata.
    fn source_name(&self) -> &str;

    /// Caveats about how this provider will treat `request`.
    fn notes(&self, _request: &DownloadRequest) -> Vec<String> {
        Vec::new()
    }
}
