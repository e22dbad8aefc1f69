use garde::Validate;
use rmcp::{
    handler::server::{
        router::tool::ToolRouter,
        wrapper::{Json, Parameters},
    },
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use crate::data::Downloader;
use crate::tools;
use crate::tools::response_types::DownloadResult;

#[derive(Clone)]
pub struct StockDataServer {
    downloader: Arc<dyn Downloader>,
    tool_router: ToolRouter<Self>,
}

impl StockDataServer {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self {
            downloader,
            tool_router: Self::tool_router(),
        }
    }
}

/// One symbol or several: `"AAPL"`, `"AAPL MSFT"`, `"AAPL,MSFT"` or `["AAPL", "MSFT"]`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TickersParam {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct DownloadStockDataParams {
    /// Stock ticker symbol(s), e.g. "AAPL", "AAPL MSFT" or ["AAPL", "MSFT"]
    #[garde(skip)]
    pub tickers: TickersParam,
    /// Time period: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max.
    /// Defaults to "1y" when neither start nor end is given.
    #[garde(inner(length(min = 1)))]
    pub period: Option<String>,
    /// Data interval: 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo. Defaults to "1d".
    #[garde(inner(length(min = 1)))]
    pub interval: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$")))]
    pub start: Option<String>,
    /// End date (YYYY-MM-DD), exclusive
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$")))]
    pub end: Option<String>,
    /// Include dividend and stock split columns (default false)
    #[garde(skip)]
    pub actions: Option<bool>,
    /// Adjust OHLC for splits and dividends (default true)
    #[garde(skip)]
    pub auto_adjust: Option<bool>,
    /// Include pre and post market bars (default false)
    #[garde(skip)]
    pub prepost: Option<bool>,
    /// Multi-ticker nesting: "column" (field, then ticker; default) or "ticker"
    #[garde(inner(length(min = 1)))]
    pub group_by: Option<String>,
    /// Attempt to repair currency unit mixups (default false)
    #[garde(skip)]
    pub repair: Option<bool>,
    /// Keep rows where every value is missing (default false)
    #[garde(skip)]
    pub keepna: Option<bool>,
    /// Round prices to 2 decimal places (default false)
    #[garde(skip)]
    pub rounding: Option<bool>,
    /// Per-request timeout in seconds (default 10)
    #[garde(inner(range(min = 0.1, max = 300.0)))]
    pub timeout: Option<f64>,
    /// Download tickers concurrently (default true)
    #[garde(skip)]
    pub threads: Option<bool>,
}

#[tool_router]
impl StockDataServer {
    /// Download historical stock data from Yahoo Finance.
    ///
    /// Returns `data` (one row per bar), `summary` (close-price statistics per
    /// ticker) and `metadata` (shape, columns, date range, warnings).
    ///
    /// **Date range**: use `period` (e.g. "5d", "1y") or explicit `start`/`end`
    ///   dates. Both are forwarded when given together: an explicit `start`
    ///   wins, and an `end` alone counts `period` back from that date.
    /// **Multiple tickers**: rows are nested by field then ticker
    ///   (`group_by: "column"`) or by ticker then field (`group_by: "ticker"`).
    /// **Errors**: invalid parameters and download failures come back as a JSON
    ///   error with a `category` of `invalid_parameter` or `upstream_failure`.
    #[tool(name = "download_stock_data")]
    async fn download_stock_data(
        &self,
        Parameters(params): Parameters<DownloadStockDataParams>,
    ) -> Result<Json<DownloadResult>, String> {
        tools::download_stock_data::execute(self.downloader.as_ref(), params)
            .await
            .map(Json)
            .map_err(|e| e.to_json())
    }
}

#[tool_handler]
impl ServerHandler for StockDataServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "stockdata-mcp".into(),
                title: None,
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Historical stock prices from Yahoo Finance.\
                \n\ndownload_stock_data({ tickers, period?, interval?, start?, end?, ... }) \
                returns OHLCV rows, close-price statistics per ticker and metadata. \
                Example: { tickers: \"AAPL\", period: \"5d\", interval: \"1d\" }. \
                Pass several tickers as \"AAPL MSFT\" or [\"AAPL\", \"MSFT\"] and choose \
                group_by \"ticker\" or \"column\" for the row layout."
                    .into(),
            ),
        }
    }
}

/// Axum app serving MCP over streamable HTTP at `/mcp`, plus `/health`.
pub fn http_router(downloader: Arc<dyn Downloader>) -> axum::Router {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    };

    let service = StreamableHttpService::new(
        move || Ok(StockDataServer::new(downloader.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    axum::Router::new()
        .nest_service("/mcp", service)
        .route("/health", axum::routing::get(|| async { "ok" }))
}
