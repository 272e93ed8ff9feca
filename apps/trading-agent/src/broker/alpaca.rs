//! Alpaca Markets REST adapter implementing [`BrokerPort`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::AlpacaSettings;

use super::{
    AccountSnapshot, BrokerError, BrokerPort, BrokerPosition, OrderAck, OrderKind, OrderRequest,
};

/// Alpaca REST client.
///
/// One request per call; bounded retries live in the order sequencer, not
/// here, so a fake broker sees the same retry behavior as the real one.
#[derive(Debug, Clone)]
pub struct AlpacaBroker {
    client: Client,
    api_key: String,
    api_secret: String,
    trading_base_url: String,
    data_base_url: String,
    live_endpoint: bool,
    paper: bool,
}

/// Production (live money) trading endpoint. Orders are never sent here.
const LIVE_ENDPOINT: &str = "https://api.alpaca.markets";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountResponse {
    equity: String,
    cash: String,
    buying_power: String,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: String,
    avg_entry_price: String,
    #[serde(default)]
    current_price: Option<String>,
    #[serde(default)]
    unrealized_pl: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderBody {
    symbol: String,
    qty: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    time_in_force: String,
    client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<StopLossLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<TakeProfitLeg>,
}

#[derive(Debug, Serialize)]
struct StopLossLeg {
    stop_price: String,
    limit_price: String,
}

#[derive(Debug, Serialize)]
struct TakeProfitLeg {
    limit_price: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    filled_qty: Option<String>,
    #[serde(default)]
    filled_avg_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Vec<Bar>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    #[serde(rename = "c")]
    close: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl AlpacaBroker {
    /// Build a client from settings.
    pub fn new(settings: &AlpacaSettings) -> Result<Self, BrokerError> {
        if settings.api_key.is_empty() || settings.api_secret.is_empty() {
            return Err(BrokerError::AuthenticationFailed);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| BrokerError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            live_endpoint: settings.trading_base_url.starts_with(LIVE_ENDPOINT),
            trading_base_url: settings.trading_base_url.clone(),
            data_base_url: settings.data_base_url.clone(),
            paper: settings.paper,
        })
    }

    async fn get<T: DeserializeOwned>(&self, base: &str, path: &str) -> Result<T, BrokerError> {
        let response = self
            .client
            .get(format!("{base}{path}"))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BrokerError> {
        let response = self
            .client
            .post(format!("{}{path}", self.trading_base_url))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BrokerError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| BrokerError::Parse(e.to_string()));
        }

        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map_or(text.clone(), |body| body.message);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BrokerError::AuthenticationFailed)
            }
            StatusCode::UNPROCESSABLE_ENTITY => Err(BrokerError::OrderRejected(message)),
            _ => Err(BrokerError::Api {
                code: status.as_u16().to_string(),
                message,
            }),
        }
    }

    fn parse_f64(value: &str, field: &str) -> Result<f64, BrokerError> {
        value
            .parse()
            .map_err(|_| BrokerError::Parse(format!("bad {field}: {value:?}")))
    }

    fn to_order_body(request: &OrderRequest) -> OrderBody {
        match &request.kind {
            OrderKind::Market => OrderBody {
                symbol: request.symbol.clone(),
                qty: format_qty(request.qty),
                side: request.side.as_str().to_string(),
                order_type: "market".to_string(),
                time_in_force: "day".to_string(),
                client_order_id: request.client_order_id.clone(),
                limit_price: None,
                order_class: None,
                stop_loss: None,
                take_profit: None,
            },
            OrderKind::Bracket {
                limit_price,
                stop_trigger,
                stop_limit,
                take_profit,
            } => OrderBody {
                symbol: request.symbol.clone(),
                qty: format_qty(request.qty),
                side: request.side.as_str().to_string(),
                order_type: "limit".to_string(),
                time_in_force: "day".to_string(),
                client_order_id: request.client_order_id.clone(),
                limit_price: Some(format_price(*limit_price)),
                order_class: Some("bracket".to_string()),
                stop_loss: Some(StopLossLeg {
                    stop_price: format_price(*stop_trigger),
                    limit_price: format_price(*stop_limit),
                }),
                take_profit: Some(TakeProfitLeg {
                    limit_price: format_price(*take_profit),
                }),
            },
        }
    }
}

fn format_qty(qty: f64) -> String {
    if (qty - qty.round()).abs() < f64::EPSILON {
        format!("{}", qty.round() as i64)
    } else {
        format!("{qty}")
    }
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

#[async_trait]
impl BrokerPort for AlpacaBroker {
    async fn account(&self) -> Result<AccountSnapshot, BrokerError> {
        let account: AccountResponse = self.get(&self.trading_base_url, "/v2/account").await?;
        Ok(AccountSnapshot {
            equity: Self::parse_f64(&account.equity, "equity")?,
            cash: Self::parse_f64(&account.cash, "cash")?,
            buying_power: Self::parse_f64(&account.buying_power, "buying_power")?,
        })
    }

    async fn open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let positions: Vec<PositionResponse> =
            self.get(&self.trading_base_url, "/v2/positions").await?;
        positions
            .into_iter()
            .map(|p| {
                Ok(BrokerPosition {
                    qty: Self::parse_f64(&p.qty, "qty")?,
                    avg_entry_price: Self::parse_f64(&p.avg_entry_price, "avg_entry_price")?,
                    current_price: p
                        .current_price
                        .as_deref()
                        .map(|v| Self::parse_f64(v, "current_price"))
                        .transpose()?
                        .unwrap_or(0.0),
                    unrealized_pnl: p
                        .unrealized_pl
                        .as_deref()
                        .map(|v| Self::parse_f64(v, "unrealized_pl"))
                        .transpose()?
                        .unwrap_or(0.0),
                    symbol: p.symbol,
                })
            })
            .collect()
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        // Hard stop: the paper flag must be set and the live endpoint is
        // always refused, whatever the config says.
        if !self.paper || self.live_endpoint {
            return Err(BrokerError::NotPaperAccount);
        }

        let body = Self::to_order_body(request);
        tracing::info!(
            symbol = %request.symbol,
            side = %request.side.as_str(),
            qty = request.qty,
            client_order_id = %request.client_order_id,
            order_type = %body.order_type,
            "Submitting order"
        );

        let response: OrderResponse = self.post("/v2/orders", &body).await?;

        tracing::info!(
            client_order_id = %request.client_order_id,
            order_id = %response.id,
            status = %response.status,
            "Order accepted"
        );

        Ok(OrderAck {
            order_id: response.id,
            status: response.status,
            filled_qty: response.filled_qty.and_then(|v| v.parse().ok()),
            filled_price: response.filled_avg_price.and_then(|v| v.parse().ok()),
        })
    }

    async fn daily_closes(&self, symbol: &str, limit: usize) -> Result<Vec<f64>, BrokerError> {
        let path = format!("/v2/stocks/{symbol}/bars?timeframe=1Day&limit={limit}");
        let bars: BarsResponse = self.get(&self.data_base_url, &path).await?;
        Ok(bars.bars.into_iter().map(|b| b.close).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::OrderSide;

    fn request_bracket() -> OrderRequest {
        OrderRequest {
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            qty: 10.0,
            kind: OrderKind::Bracket {
                limit_price: 100.0,
                stop_trigger: 95.0,
                stop_limit: 92.5,
                take_profit: 110.0,
            },
            client_order_id: "20260827_morning_093000_AAPL_buy".to_string(),
        }
    }

    #[test]
    fn bracket_order_body_has_both_legs() {
        let body = AlpacaBroker::to_order_body(&request_bracket());
        assert_eq!(body.order_type, "limit");
        assert_eq!(body.time_in_force, "day");
        assert_eq!(body.order_class.as_deref(), Some("bracket"));
        assert_eq!(body.limit_price.as_deref(), Some("100.00"));
        let stop = body.stop_loss.unwrap();
        assert_eq!(stop.stop_price, "95.00");
        assert_eq!(stop.limit_price, "92.50");
        assert_eq!(body.take_profit.unwrap().limit_price, "110.00");
        assert_eq!(body.qty, "10");
    }

    #[test]
    fn market_order_body_is_plain() {
        let request = OrderRequest {
            symbol: "XOM".to_string(),
            side: OrderSide::Sell,
            qty: 7.0,
            kind: OrderKind::Market,
            client_order_id: "20260827_morning_093000_XOM_sell".to_string(),
        };
        let body = AlpacaBroker::to_order_body(&request);
        assert_eq!(body.order_type, "market");
        assert_eq!(body.time_in_force, "day");
        assert!(body.order_class.is_none());
        assert!(body.stop_loss.is_none());
        assert!(body.take_profit.is_none());
    }

    #[test]
    fn missing_credentials_fail_construction() {
        let settings = AlpacaSettings::default();
        assert!(matches!(
            AlpacaBroker::new(&settings),
            Err(BrokerError::AuthenticationFailed)
        ));
    }

    #[test]
    fn fractional_qty_preserved() {
        assert_eq!(format_qty(2.0), "2");
        assert_eq!(format_qty(1.5), "1.5");
    }
}
