//! REST client for the venue API
//!
//! All endpoints return the uniform `{errno, errmsg, result}` envelope;
//! `errno == 0` is success. Non-zero envelopes and transport failures are
//! classified into `VenueError` kinds here. Orders are signed through the
//! injected `OrderSigner` before submission.

use super::error::{error_from_status, Result, VenueError};
use super::signer::OrderSigner;
use super::types::{
    ApiEnvelope, MarketData, MarketListData, OpenOrder, OpenOrderFilter, OrderPlacement,
    OrderQuantity, OrderRequest, OrderbookData, Position, TxResult,
};
use super::VenueClient;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://proxy.opinion.trade:8443/api/bsc/api/v2";
pub const DEFAULT_CHAIN_ID: u64 = 56;

/// Per-call deadline for most endpoints.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Market-list and profile calls are slower server side.
const SLOW_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-account REST client. Each account gets its own instance carrying its
/// own signing context.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    signer: OrderSigner,
    chain_id: u64,
    account: String,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        signer: OrderSigner,
        account: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            signer,
            chain_id: DEFAULT_CHAIN_ID,
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn signer_address(&self) -> ethers::types::Address {
        self.signer.address()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport)?;
        self.read_envelope(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport)?;
        self.read_envelope(response).await
    }

    async fn read_envelope<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await.map_err(map_transport)?;
        if !status.is_success() {
            return Err(error_from_status(status.as_u16(), &text));
        }
        let envelope: ApiEnvelope<T> = serde_json::from_str(&text).map_err(|e| VenueError::Api {
            errno: -1,
            errmsg: format!("malformed response: {e}"),
        })?;
        if envelope.errno != 0 {
            return Err(VenueError::classify(envelope.errno, &envelope.errmsg));
        }
        envelope.result.ok_or_else(|| VenueError::Api {
            errno: -1,
            errmsg: "empty result".to_string(),
        })
    }

    /// Canonical payload string signed alongside each order.
    fn order_payload(&self, order: &OrderRequest) -> serde_json::Value {
        let mut payload = json!({
            "tokenId": order.token_id,
            "side": order.side.as_str(),
            "orderType": order.order_type,
            "price": order.price_string(),
        });
        match order.quantity {
            OrderQuantity::Shares(shares) => payload["shares"] = json!(shares),
            OrderQuantity::Quote(amount) => payload["amount"] = json!(format!("{amount:.2}")),
        }
        payload
    }
}

fn map_transport(err: reqwest::Error) -> VenueError {
    if err.is_timeout() {
        VenueError::Network(format!("timeout: {err}"))
    } else {
        VenueError::Network(err.to_string())
    }
}

#[async_trait]
impl VenueClient for RestClient {
    async fn get_orderbook(&self, token_id: &str) -> Result<OrderbookData> {
        self.get_json(
            "/orderbook",
            &[("tokenId", token_id.to_string())],
            DEFAULT_TIMEOUT,
        )
        .await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderPlacement> {
        let payload = self.order_payload(order);
        let payload_str = payload.to_string();
        let signature = self
            .signer
            .sign(&payload_str)
            .await
            .map_err(|e| VenueError::Api {
                errno: -1,
                errmsg: format!("signing failed: {e}"),
            })?;
        debug!(
            account = %self.account,
            token_id = %order.token_id,
            side = %order.side,
            price = %order.price_string(),
            "submitting order"
        );
        self.post_json(
            "/order",
            json!({ "order": payload, "signature": signature }),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                "/order/cancel",
                json!({ "orderId": order_id }),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<OpenOrder> {
        self.get_json(
            "/order",
            &[("orderId", order_id.to_string())],
            DEFAULT_TIMEOUT,
        )
        .await
    }

    async fn get_open_orders(&self, filter: &OpenOrderFilter) -> Result<Vec<OpenOrder>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(market_id) = filter.market_id {
            query.push(("marketId", market_id.to_string()));
        }
        if let Some(token_id) = &filter.token_id {
            query.push(("tokenId", token_id.clone()));
        }
        self.get_json("/orders", &query, DEFAULT_TIMEOUT).await
    }

    async fn get_positions(&self, market_id: Option<i64>) -> Result<Vec<Position>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(market_id) = market_id {
            query.push(("marketId", market_id.to_string()));
        }
        self.get_json("/positions", &query, DEFAULT_TIMEOUT).await
    }

    async fn get_balance(&self) -> Result<f64> {
        #[derive(serde::Deserialize)]
        struct Balance {
            #[serde(default)]
            balance: f64,
        }
        let balance: Balance = self.get_json("/balance", &[], DEFAULT_TIMEOUT).await?;
        Ok(balance.balance)
    }

    async fn get_market(&self, market_id: i64) -> Result<MarketData> {
        self.get_json(
            &format!("/market/{market_id}"),
            &[("chainId", self.chain_id.to_string())],
            DEFAULT_TIMEOUT,
        )
        .await
    }

    async fn get_categorical_market(&self, market_id: i64) -> Result<MarketData> {
        self.get_json(
            &format!("/market/categorical/{market_id}"),
            &[("chainId", self.chain_id.to_string())],
            DEFAULT_TIMEOUT,
        )
        .await
    }

    async fn get_markets(&self) -> Result<Vec<MarketData>> {
        let data: MarketListData = self
            .get_json(
                "/markets",
                &[("chainId", self.chain_id.to_string())],
                SLOW_TIMEOUT,
            )
            .await?;
        Ok(data.list)
    }

    async fn merge(&self, market_id: i64, shares: u64) -> Result<TxResult> {
        self.post_json(
            "/position/merge",
            json!({ "marketId": market_id, "shares": shares }),
            SLOW_TIMEOUT,
        )
        .await
    }

    async fn split(&self, market_id: i64, amount: u64) -> Result<TxResult> {
        self.post_json(
            "/position/split",
            json!({ "marketId": market_id, "amount": amount }),
            SLOW_TIMEOUT,
        )
        .await
    }

    async fn redeem(&self, market_id: i64) -> Result<TxResult> {
        self.post_json(
            "/position/redeem",
            json!({ "marketId": market_id }),
            SLOW_TIMEOUT,
        )
        .await
    }
}

/// Resolve the multi-signed (proxy) wallet address for an EOA from the venue
/// profile endpoint. Unauthenticated; used by the account loader.
pub async fn fetch_proxy_address(
    http: &reqwest::Client,
    base_url: &str,
    eoa_address: &str,
    chain_id: u64,
) -> Result<Option<String>> {
    #[derive(serde::Deserialize)]
    struct Profile {
        #[serde(rename = "multiSignedWalletAddress", default)]
        multi_signed: std::collections::HashMap<String, String>,
    }

    let url = format!("{base_url}/user/{eoa_address}/profile");
    let response = http
        .get(&url)
        .query(&[("chainId", chain_id.to_string())])
        .timeout(SLOW_TIMEOUT)
        .send()
        .await
        .map_err(map_transport)?;
    let status = response.status();
    let text = response.text().await.map_err(map_transport)?;
    if !status.is_success() {
        warn!(eoa = %eoa_address, status = %status, "profile lookup failed");
        return Err(error_from_status(status.as_u16(), &text));
    }
    let envelope: ApiEnvelope<Profile> = serde_json::from_str(&text).map_err(|e| {
        VenueError::Api {
            errno: -1,
            errmsg: format!("malformed profile response: {e}"),
        }
    })?;
    if envelope.errno != 0 {
        return Err(VenueError::classify(envelope.errno, &envelope.errmsg));
    }
    Ok(envelope
        .result
        .and_then(|p| p.multi_signed.get(&chain_id.to_string()).cloned()))
}
