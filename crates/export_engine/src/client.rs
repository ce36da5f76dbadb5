use std::time::Duration;

use export_core::Page;
use export_logging::export_trace;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::types::Listing;
use crate::{ApiError, FailureKind, Instrument, Market, Order, Position};

pub const DEFAULT_BASE_URL: &str = "https://api.robinhood.com/";

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Remote brokerage API.
///
/// Listing calls take the cursor returned by the previous page (empty for the
/// first one). Detail calls accept either a bare id or the canonical URL found
/// in cross-references. Every call should give up once `cancel` fires.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    async fn orders_page(
        &self,
        cursor: &str,
        cancel: &CancellationToken,
    ) -> Result<Page<Order>, ApiError>;

    async fn positions_page(
        &self,
        cursor: &str,
        cancel: &CancellationToken,
    ) -> Result<Page<Position>, ApiError>;

    async fn instrument(&self, id: &str, cancel: &CancellationToken)
        -> Result<Instrument, ApiError>;

    async fn market(&self, id: &str, cancel: &CancellationToken) -> Result<Market, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApiClient {
    settings: ApiSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ApiError> {
        let mut base = Url::parse(&settings.base_url)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = settings.token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| ApiError::new(FailureKind::ClientSetup, err.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ApiError::new(FailureKind::ClientSetup, err.to_string()))?;

        Ok(Self {
            settings,
            base,
            client,
        })
    }

    fn listing_url(&self, collection: &str, cursor: &str) -> Result<Url, ApiError> {
        if cursor.is_empty() {
            self.join(&format!("{collection}/"))
        } else {
            self.pinned(parse_url(cursor)?)
        }
    }

    fn detail_url(&self, collection: &str, id: &str) -> Result<Url, ApiError> {
        if id.starts_with("http://") || id.starts_with("https://") {
            self.pinned(parse_url(id)?)
        } else {
            self.join(&format!("{collection}/{id}/"))
        }
    }

    /// Server-supplied URLs must stay on the base origin; the bearer token
    /// travels with every request.
    fn pinned(&self, url: Url) -> Result<Url, ApiError> {
        if url.origin() == self.base.origin() {
            Ok(url)
        } else {
            Err(ApiError::new(
                FailureKind::InvalidUrl,
                format!("{url} is outside {}", self.base),
            ))
        }
    }

    fn join(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        cursor: &str,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, ApiError> {
        let url = self.listing_url(collection, cursor)?;
        let listing: Listing<T> = self.get_json(url, cancel).await?;
        Ok(Page::new(listing.results, listing.next.unwrap_or_default()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        export_trace!("GET {}", url);
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ApiError::new(
                    FailureKind::Cancelled,
                    format!("request to {url} cancelled"),
                ));
            }
            bytes = self.download(url.clone()) => bytes?,
        };
        serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::new(FailureKind::Decode, format!("{url}: {err}")))
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>, ApiError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("{} returned {}", response.url(), status),
            ));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(ApiError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(ApiError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl ApiClient for ReqwestApiClient {
    async fn orders_page(
        &self,
        cursor: &str,
        cancel: &CancellationToken,
    ) -> Result<Page<Order>, ApiError> {
        self.list("orders", cursor, cancel).await
    }

    async fn positions_page(
        &self,
        cursor: &str,
        cancel: &CancellationToken,
    ) -> Result<Page<Position>, ApiError> {
        self.list("positions", cursor, cancel).await
    }

    async fn instrument(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Instrument, ApiError> {
        let url = self.detail_url("instruments", id)?;
        self.get_json(url, cancel).await
    }

    async fn market(&self, id: &str, cancel: &CancellationToken) -> Result<Market, ApiError> {
        let url = self.detail_url("markets", id)?;
        self.get_json(url, cancel).await
    }
}

fn parse_url(raw: &str) -> Result<Url, ApiError> {
    Url::parse(raw).map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
