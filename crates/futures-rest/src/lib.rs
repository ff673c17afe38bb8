//! USDT-M futures REST client.
//!
//! This crate provides everything needed to talk to the futures REST API:
//!
//! - **Transport**: `RestClient`, a thin `reqwest` wrapper with rate-limit
//!   detection
//! - **Auth**: `ApiCredentials` (secret held in `SecretString`) and
//!   HMAC-SHA256 `RequestSigner`
//! - **Client**: `FuturesRestClient` with server-time sync and typed order,
//!   ticker and exchange-info endpoints
//! - **Gateway**: `FuturesGateway`, which implements `order_core::OrderGateway`
//!   and `order_core::SymbolFilters` on top of the client
//!
//! # Example
//!
//! ```rust,ignore
//! use common::FuturesEnvironment;
//! use futures_rest::{ApiCredentials, FuturesGateway, FuturesRestClient};
//!
//! let credentials = ApiCredentials::from_env()?;
//! let client = FuturesRestClient::with_credentials(credentials, FuturesEnvironment::Testnet)?;
//! client.sync_time().await?;
//! let gateway = FuturesGateway::new(client);
//! ```

mod client;
mod credentials;
mod error;
mod gateway;
mod responses;
mod rest;
mod signer;

pub use client::FuturesRestClient;
pub use credentials::ApiCredentials;
pub use error::{FuturesRestError, RestError};
pub use gateway::FuturesGateway;
pub use responses::{
    ExchangeInfoResponse, FuturesOrderResponse, ServerTimeResponse, SymbolFilterEntry,
    SymbolInfo, TickerPriceResponse,
};
pub use rest::RestClient;
pub use signer::RequestSigner;
