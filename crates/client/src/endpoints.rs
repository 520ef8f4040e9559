//! Route builders for the REST catalogue

use chrono::NaiveDate;
use common::constants::{format_route, routes};
use common::{InstrumentType, ListType, OrderType, TimePeriod, TransactionType};
use serde::Serialize;

fn encode(component: &str) -> String {
    url::form_urlencoded::byte_serialize(component.as_bytes()).collect()
}

#[must_use]
pub fn account_overview(account_id: &str) -> String {
    format_route(routes::ACCOUNT_OVERVIEW, &[account_id])
}

/// Add/remove target for one order book in one watchlist
#[must_use]
pub fn watchlist_entry(watchlist_id: &str, instrument_id: &str) -> String {
    format_route(routes::WATCHLISTS_ADD_DELETE, &[watchlist_id, instrument_id])
}

#[must_use]
pub fn instrument(instrument_type: InstrumentType, instrument_id: &str) -> String {
    format_route(routes::INSTRUMENT, &[instrument_type.as_str(), instrument_id])
}

#[must_use]
pub fn order_book(instrument_type: InstrumentType, order_book_id: &str) -> String {
    format_route(routes::ORDERBOOK, &[instrument_type.as_str(), &encode(order_book_id)])
}

#[must_use]
pub fn order_books<S: AsRef<str>>(order_book_ids: &[S]) -> String {
    let joined = order_book_ids
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",");
    format_route(routes::ORDERBOOK_LIST, &[&joined])
}

#[must_use]
pub fn insights_report(account_id: &str, period: TimePeriod) -> String {
    format_route(routes::INSIGHTS, &[period.as_str(), &encode(account_id)])
}

/// Index of all inspiration lists
#[must_use]
pub fn inspiration_lists() -> String {
    format_route(routes::INSPIRATION_LIST, &[""])
}

#[must_use]
pub fn inspiration_list(list_type: ListType) -> String {
    format_route(routes::INSPIRATION_LIST, &[list_type.as_str()])
}

/// Chart routes take the period in lower case
#[must_use]
pub fn chart_data(order_book_id: &str, period: TimePeriod) -> String {
    let period = period.as_str().to_ascii_lowercase();
    format_route(routes::CHARTDATA, &[order_book_id, &period])
}

#[must_use]
pub fn search(instrument_type: InstrumentType, query: &str, limit: u32) -> String {
    format_route(
        routes::SEARCH,
        &[instrument_type.as_str(), &encode(query), &limit.to_string()],
    )
}

#[must_use]
pub fn transactions(transaction_type: TransactionType) -> String {
    format_route(routes::TRANSACTIONS, &[transaction_type.as_str()])
}

#[must_use]
pub fn get_order(instrument_type: InstrumentType, account_id: &str, order_id: &str) -> String {
    format_route(
        routes::ORDER_GET,
        &[instrument_type.as_str(), &encode(account_id), &encode(order_id)],
    )
}

#[must_use]
pub fn delete_order(account_id: &str, order_id: &str) -> String {
    format_route(routes::ORDER_DELETE, &[&encode(account_id), &encode(order_id)])
}

/// Body of a limit order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub account_id: String,
    #[serde(rename = "orderbookId")]
    pub order_book_id: String,
    pub order_type: OrderType,
    pub price: f64,
    /// Serialized as `YYYY-MM-DD`
    pub valid_until: NaiveDate,
    pub volume: u64,
}
