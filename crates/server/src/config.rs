//! Environment configuration

use engine::api::DEFAULT_GAMMA_URL;
use engine::GatewayCredentials;
use std::collections::HashMap;

pub const DEFAULT_DB_PATH: &str = "data/poly_gate.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3090;
pub const DEFAULT_GATEWAY_URL: &str = "https://clob.polymarket.com";
pub const DEFAULT_MIRROR_CATEGORY: &str = "crypto";

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    /// Bearer secret for `/cron/*`; unset allows every caller
    pub cron_secret: Option<String>,
    pub gateway_url: String,
    pub credentials: Option<GatewayCredentials>,
    pub gamma_url: String,
    pub whale_feed_url: Option<String>,
    /// Lower-cased wallet addresses mirrored by `mirror-run`
    pub mirror_watchlist: Vec<String>,
    /// Market category mirrored by `mirror-run`; `None` mirrors every category
    pub mirror_category: Option<String>,
    pub serialize_execution: bool,
}

impl GateConfig {
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = match (get("POLY_GATEWAY_API_KEY"), get("POLY_PUBLIC_KEY")) {
            (Some(api_key), Some(public_key)) => Some(GatewayCredentials {
                api_key,
                public_key,
            }),
            _ => None,
        };

        Self {
            db_path: get("POLY_GATE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            host: get("POLY_GATE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: get("POLY_GATE_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            cron_secret: get("CRON_SECRET"),
            gateway_url: get("POLY_ORDER_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            credentials,
            gamma_url: get("POLY_GAMMA_URL").unwrap_or_else(|| DEFAULT_GAMMA_URL.to_string()),
            whale_feed_url: get("POLY_WHALE_FEED_URL"),
            mirror_watchlist: get("POLY_MIRROR_WATCHLIST")
                .map(|list| {
                    list.split(',')
                        .map(|w| w.trim().to_lowercase())
                        .filter(|w| !w.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            mirror_category: match get("POLY_MIRROR_CATEGORY") {
                None => Some(DEFAULT_MIRROR_CATEGORY.to_string()),
                Some(c) if matches!(c.to_lowercase().as_str(), "any" | "all") => None,
                Some(c) => Some(c.to_lowercase()),
            },
            serialize_execution: get("POLY_SERIALIZE_EXECUTION")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
