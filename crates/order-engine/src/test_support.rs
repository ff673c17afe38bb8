//! Scripted gateway and fixtures for strategy tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use order_core::{
    now_ms, CancelError, OrderGateway, OrderHandle, OrderRequest, OrderStatus, OrderSubmissionError,
    OrderType, OrderUpdate, QueryError, StaticSymbolFilters, SymbolFilter,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::Instant;

use crate::context::Collaborators;
use crate::journal::MemoryJournal;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Place(OrderRequest),
    Cancel(String),
    Status(String),
    Ticker,
}

#[derive(Default)]
struct Script {
    ids: VecDeque<String>,
    next_id: u64,
    place_failures: HashMap<usize, OrderSubmissionError>,
    reads: HashMap<String, VecDeque<Result<OrderUpdate, QueryError>>>,
    query_failures: HashMap<String, VecDeque<QueryError>>,
    cancel_results: HashMap<String, VecDeque<Result<(), CancelError>>>,
    canceled: HashSet<String>,
    ticker: Option<Decimal>,
    places: usize,
    calls: Vec<(Call, Instant)>,
}

/// Gateway that answers from a script and records every call.
///
/// Queries first drain the id's scripted failures. Otherwise a successful
/// cancel makes them report `Canceled`, and failing that they pop the id's
/// read queue, repeating the last entry once a single one remains. Market
/// orders come back `Filled` at the ticker price.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.lock().ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Fail the `index`th place call (zero-based).
    pub(crate) fn fail_place(self, index: usize, err: OrderSubmissionError) -> Self {
        self.script.lock().place_failures.insert(index, err);
        self
    }

    pub(crate) fn with_statuses<I>(self, id: &str, statuses: I) -> Self
    where
        I: IntoIterator<Item = OrderStatus>,
    {
        self.with_reads(id, statuses.into_iter().map(|s| Ok(OrderUpdate::from(s))))
    }

    /// Script reads in order, so a failure can follow a successful read.
    pub(crate) fn with_reads<I>(self, id: &str, reads: I) -> Self
    where
        I: IntoIterator<Item = Result<OrderUpdate, QueryError>>,
    {
        self.script
            .lock()
            .reads
            .insert(id.to_string(), reads.into_iter().collect());
        self
    }

    pub(crate) fn fail_queries<I>(self, id: &str, errors: I) -> Self
    where
        I: IntoIterator<Item = QueryError>,
    {
        self.script
            .lock()
            .query_failures
            .insert(id.to_string(), errors.into_iter().collect());
        self
    }

    pub(crate) fn with_cancel_results<I>(self, id: &str, results: I) -> Self
    where
        I: IntoIterator<Item = Result<(), CancelError>>,
    {
        self.script
            .lock()
            .cancel_results
            .insert(id.to_string(), results.into_iter().collect());
        self
    }

    pub(crate) fn with_ticker(self, price: Decimal) -> Self {
        self.script.lock().ticker = Some(price);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.iter().map(|(c, _)| c.clone()).collect()
    }

    /// Place calls with the instant each was made.
    pub(crate) fn placed(&self) -> Vec<(OrderRequest, Instant)> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|(c, at)| match c {
                Call::Place(r) => Some((r.clone(), *at)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn cancels(&self) -> Vec<String> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|(c, _)| match c {
                Call::Cancel(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn mutating_calls(&self) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|(c, _)| matches!(c, Call::Place(_) | Call::Cancel(_)))
            .count()
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn place(&self, request: &OrderRequest) -> Result<OrderHandle, OrderSubmissionError> {
        let mut script = self.script.lock();
        script.calls.push((Call::Place(request.clone()), Instant::now()));
        let index = script.places;
        script.places += 1;

        if let Some(err) = script.place_failures.remove(&index) {
            return Err(err);
        }
        let id = match script.ids.pop_front() {
            Some(id) => id,
            None => {
                script.next_id += 1;
                format!("{}", 1000 + script.next_id)
            }
        };
        let handle = if request.order_type == OrderType::Market {
            OrderHandle::new(id, request.clone(), OrderStatus::Filled, now_ms())
                .with_fill(request.quantity, script.ticker)
        } else {
            OrderHandle::new(id, request.clone(), OrderStatus::New, now_ms())
        };
        Ok(handle)
    }

    async fn cancel(&self, exchange_order_id: &str, _symbol: &str) -> Result<(), CancelError> {
        let mut script = self.script.lock();
        script
            .calls
            .push((Call::Cancel(exchange_order_id.to_string()), Instant::now()));
        let result = script
            .cancel_results
            .get_mut(exchange_order_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(()));
        if result.is_ok() {
            script.canceled.insert(exchange_order_id.to_string());
        }
        result
    }

    async fn status(
        &self,
        exchange_order_id: &str,
        _symbol: &str,
    ) -> Result<OrderUpdate, QueryError> {
        let mut script = self.script.lock();
        script
            .calls
            .push((Call::Status(exchange_order_id.to_string()), Instant::now()));

        if let Some(err) = script
            .query_failures
            .get_mut(exchange_order_id)
            .and_then(|q| q.pop_front())
        {
            return Err(err);
        }
        if script.canceled.contains(exchange_order_id) {
            return Ok(OrderUpdate::new(OrderStatus::Canceled));
        }
        let read = match script.reads.get_mut(exchange_order_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        read.unwrap_or(Ok(OrderUpdate::new(OrderStatus::New)))
    }

    async fn ticker_price(&self, _symbol: &str) -> Result<Decimal, QueryError> {
        let mut script = self.script.lock();
        script.calls.push((Call::Ticker, Instant::now()));
        script
            .ticker
            .ok_or_else(|| QueryError::new("no ticker scripted", false))
    }
}

pub(crate) fn btc_filter() -> SymbolFilter {
    SymbolFilter::new(dec!(0.1), dec!(0.001), dec!(0.001), dec!(100))
}

/// Collaborators over `gateway` with BTCUSDT filters and a memory journal.
pub(crate) fn collaborators(
    gateway: Arc<ScriptedGateway>,
) -> (Collaborators, Arc<MemoryJournal>) {
    collaborators_with_filter(gateway, btc_filter())
}

pub(crate) fn collaborators_with_filter(
    gateway: Arc<ScriptedGateway>,
    filter: SymbolFilter,
) -> (Collaborators, Arc<MemoryJournal>) {
    let journal = Arc::new(MemoryJournal::new());
    let filters = StaticSymbolFilters::new().with_symbol("BTCUSDT", filter);
    let ctx = Collaborators::new(gateway, Arc::new(filters), journal.clone());
    (ctx, journal)
}
