//! Export engine: pagination, bounded fan-out, API client and dataset output.
mod client;
mod export;
mod fan_out;
mod paginate;
mod persist;
mod pipeline;
mod types;

pub use client::{ApiClient, ApiSettings, ReqwestApiClient, DEFAULT_BASE_URL};
pub use export::{write_export, ExportError, ExportOptions, ExportSummary};
pub use export_core::Page;
pub use fan_out::{Cancelled, ConcurrentFetcher, FetchSettings, DEFAULT_MAX_CONCURRENCY};
pub use paginate::aggregate_pages;
pub use persist::{ensure_output_dir, DatasetWriter, PersistError};
pub use pipeline::{ExportPipeline, OrderRow, PositionRow};
pub use tokio_util::sync::CancellationToken;
pub use types::{ApiError, FailureKind, Instrument, Market, Order, Position};
