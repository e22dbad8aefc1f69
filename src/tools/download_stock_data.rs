use std::time::Instant;

use crate::data::Downloader;
use crate::error::ToolError;
use crate::server::DownloadStockDataParams;

use super::response_types::DownloadResult;
use super::serialize;
use super::validate::{self, Validated};

/// Validate, download, serialize. No retry on failure.
pub async fn execute(
    downloader: &dyn Downloader,
    params: DownloadStockDataParams,
) -> Result<DownloadResult, ToolError> {
    let started = Instant::now();

    let Validated {
        request,
        mut warnings,
    } = validate::validate(params).inspect_err(|e| tracing::warn!("Rejected request: {e}"))?;
    warnings.extend(downloader.notes(&request));
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    tracing::info!(
        tickers = ?request.tickers,
        period = %request.span_label(),
        interval = %request.interval,
        "Downloading stock data"
    );

    let table = downloader.download(&request).await.map_err(|e| {
        tracing::warn!("Download failed: {e:#}");
        ToolError::upstream(&e)
    })?;

    let result = serialize::build_result(
        table,
        &request,
        warnings,
        downloader.source_name(),
        started,
    )
    .map_err(|e| ToolError::upstream(&e))?;

    tracing::info!(
        rows = result.metadata.shape[0],
        columns = result.metadata.shape[1],
        elapsed_ms = result.metadata.processing_time_ms,
        "Download complete"
    );
    Ok(result)
}
