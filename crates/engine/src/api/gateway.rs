//! Order gateway client: forwards signed-order requests to the broker
//!
//! Order signing and HMAC auth happen behind the gateway; this client only
//! carries the order payload and the wallet/API identity headers.

use crate::broker::{BrokerClient, BrokerError, OrderReceipt, OrderRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub public_key: String,
}

#[derive(Clone)]
pub struct OrderGatewayClient {
    client: Client,
    base_url: String,
    credentials: Option<GatewayCredentials>,
}

impl OrderGatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<GatewayCredentials>,
    ) -> Result<Self, BrokerError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

#[async_trait]
impl BrokerClient for OrderGatewayClient {
    fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// GET /ok
    async fn ping(&self) -> Result<(), BrokerError> {
        let url = format!("{}/ok", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BrokerError::Unreachable(format!(
                "gateway returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// POST /order
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError> {
        let creds = self.credentials.as_ref().ok_or(BrokerError::NotConfigured)?;
        let url = format!("{}/order", self.base_url);
        debug!(token_id = %order.token_id, price = %order.price, size = %order.size, "Posting order");

        let resp = self
            .client
            .post(&url)
            .header("POLY_API_KEY", &creds.api_key)
            .header("POLY_ADDRESS", &creds.public_key)
            .json(order)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "Order gateway rejected order");
            return Err(BrokerError::Rejected(format!("{}: {}", status, body)));
        }

        let receipt: OrderReceipt = resp.json().await?;
        Ok(receipt)
    }
}
