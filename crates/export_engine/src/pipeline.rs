use std::collections::HashMap;
use std::sync::Arc;

use export_core::{collect_unique, index_by};
use export_logging::export_info;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::fan_out::{ConcurrentFetcher, FetchSettings};
use crate::paginate::aggregate_pages;
use crate::{ApiClient, ApiError, Instrument, Market, Order, Position};

/// One exported order joined with its instrument and market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRow {
    pub created_at: String,
    pub symbol: String,
    pub name: String,
    pub market: String,
    pub side: String,
    pub order_type: String,
    pub state: String,
    pub quantity: String,
    pub average_price: Option<String>,
    pub fees: Option<String>,
    pub order_id: String,
    pub instrument_url: String,
}

/// One exported position joined with its instrument and market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionRow {
    pub symbol: String,
    pub name: String,
    pub market: String,
    pub quantity: String,
    pub average_buy_price: String,
    pub updated_at: String,
    pub instrument_url: String,
}

/// Listing → referenced instruments → their markets → flat rows.
pub struct ExportPipeline {
    client: Arc<dyn ApiClient>,
    fetcher: ConcurrentFetcher,
}

impl ExportPipeline {
    pub fn new(client: Arc<dyn ApiClient>, settings: FetchSettings) -> Self {
        Self {
            client,
            fetcher: ConcurrentFetcher::new(settings),
        }
    }

    pub async fn export_orders(&self, cancel: &CancellationToken) -> Result<Vec<OrderRow>, ApiError> {
        let client = Arc::clone(&self.client);
        let orders = aggregate_pages(cancel, |cursor, token| {
            let client = Arc::clone(&client);
            async move { client.orders_page(&cursor, &token).await }
        })
        .await?;
        export_info!("listed {} orders", orders.len());

        let refs = self
            .resolve_references(cancel, collect_unique(&orders, |o| o.instrument.clone()))
            .await?;
        Ok(orders.iter().map(|order| refs.order_row(order)).collect())
    }

    pub async fn export_positions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<PositionRow>, ApiError> {
        let client = Arc::clone(&self.client);
        let positions = aggregate_pages(cancel, |cursor, token| {
            let client = Arc::clone(&client);
            async move { client.positions_page(&cursor, &token).await }
        })
        .await?;
        export_info!("listed {} positions", positions.len());

        let refs = self
            .resolve_references(cancel, collect_unique(&positions, |p| p.instrument.clone()))
            .await?;
        Ok(positions
            .iter()
            .map(|position| refs.position_row(position))
            .collect())
    }

    pub async fn load_instruments(
        &self,
        cancel: &CancellationToken,
        ids: &[String],
    ) -> Result<Vec<Instrument>, ApiError> {
        let client = Arc::clone(&self.client);
        self.fetcher
            .fetch_all(cancel, ids, move |id, token| {
                let client = Arc::clone(&client);
                async move { client.instrument(&id, &token).await }
            })
            .await
    }

    pub async fn load_markets(
        &self,
        cancel: &CancellationToken,
        ids: &[String],
    ) -> Result<Vec<Market>, ApiError> {
        let client = Arc::clone(&self.client);
        self.fetcher
            .fetch_all(cancel, ids, move |id, token| {
                let client = Arc::clone(&client);
                async move { client.market(&id, &token).await }
            })
            .await
    }

    async fn resolve_references(
        &self,
        cancel: &CancellationToken,
        instrument_ids: Vec<String>,
    ) -> Result<References, ApiError> {
        let instruments = self.load_instruments(cancel, &instrument_ids).await?;
        let market_ids = collect_unique(&instruments, |i| i.market.clone());
        let markets = self.load_markets(cancel, &market_ids).await?;
        export_info!(
            "resolved {} instruments on {} markets",
            instruments.len(),
            markets.len()
        );

        Ok(References {
            instruments: index_by(instruments, |i| i.url.clone()),
            markets: index_by(markets, |m| m.url.clone()),
        })
    }
}

struct References {
    instruments: HashMap<String, Instrument>,
    markets: HashMap<String, Market>,
}

struct Described {
    symbol: String,
    name: String,
    market: String,
}

impl References {
    /// Unknown instruments or markets leave the joined columns empty.
    fn describe(&self, instrument_url: &str) -> Described {
        let Some(instrument) = self.instruments.get(instrument_url) else {
            return Described {
                symbol: String::new(),
                name: String::new(),
                market: String::new(),
            };
        };
        let market = self
            .markets
            .get(&instrument.market)
            .map(|m| m.acronym.clone())
            .unwrap_or_default();
        Described {
            symbol: instrument.symbol.clone(),
            name: instrument.display_name().to_string(),
            market,
        }
    }

    fn order_row(&self, order: &Order) -> OrderRow {
        let Described {
            symbol,
            name,
            market,
        } = self.describe(&order.instrument);
        OrderRow {
            created_at: order.created_at.clone(),
            symbol,
            name,
            market,
            side: order.side.clone(),
            order_type: order.order_type.clone(),
            state: order.state.clone(),
            quantity: order.quantity.clone(),
            average_price: order.average_price.clone(),
            fees: order.fees.clone(),
            order_id: order.id.clone(),
            instrument_url: order.instrument.clone(),
        }
    }

    fn position_row(&self, position: &Position) -> PositionRow {
        let Described {
            symbol,
            name,
            market,
        } = self.describe(&position.instrument);
        PositionRow {
            symbol,
            name,
            market,
            quantity: position.quantity.clone(),
            average_buy_price: position.average_buy_price.clone(),
            updated_at: position.updated_at.clone(),
            instrument_url: position.instrument.clone(),
        }
    }
}
