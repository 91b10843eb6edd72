//! HTTP clients for external services

pub mod gateway;
pub mod polymarket;

pub use gateway::{GatewayCredentials, OrderGatewayClient};
pub use polymarket::{GammaClient, GammaMarket, DEFAULT_GAMMA_URL};
