//! Core order types and the exchange boundary.
//!
//! This crate provides the vocabulary shared by the exchange client and the
//! order engine:
//!
//! - **Order types**: `OrderRequest`, `OrderHandle`, `OrderSide`, `OrderType`,
//!   `OrderStatus`, `OrderUpdate`, `TimeInForce`
//! - **Symbol filters**: `SymbolFilter` (tick/step/min-qty/min-notional) with
//!   price and quantity rounding, plus the `SymbolFilters` lookup trait
//! - **Gateway**: the `OrderGateway` trait and its boundary errors
//!
//! # Handle lifecycle
//!
//! An `OrderHandle` is created from a successful `place` call and is then only
//! changed by `OrderHandle::apply_status` or `OrderHandle::apply_update`.
//! Once a handle reaches a terminal status (Filled, Canceled, Rejected,
//! Expired) further updates are ignored.

mod filters;
mod gateway;
mod ids;
mod order;

pub use filters::{
    FallbackSymbolFilters, FilterError, StaticSymbolFilters, SymbolFilter, SymbolFilters,
};
pub use gateway::{
    CancelError, OrderGateway, OrderSubmissionError, QueryError, SubmissionErrorKind,
};
pub use ids::{generate_client_order_id, now_ms};
pub use order::{
    OrderHandle, OrderRequest, OrderSide, OrderStatus, OrderType, OrderUpdate,
    ParseOrderEnumError, TimeInForce,
};
