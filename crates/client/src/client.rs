//! Client facade owning the request gateway and the push channel

use crate::endpoints::{self, OrderRequest};
use auth::{Credentials, RequestGateway, Session, SessionNegotiator};
use common::constants::routes;
use common::{
    ChannelType, ClientConfig, HttpMethod, InstrumentType, ListType, Result, TimePeriod,
    TransactionType,
};
use feeds::{PushChannelManager, PushEvent, PushMessage, PushState, SseListener, SubscriptionHandle};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Authenticated Avanza client
///
/// Several independent clients can live in one process; nothing is global.
pub struct Avanza {
    config: ClientConfig,
    gateway: Arc<RequestGateway>,
    push: PushChannelManager,
}

impl std::fmt::Debug for Avanza {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Avanza")
            .field("base_url", &self.config.base_url)
            .field("push", &self.push)
            .finish()
    }
}

impl Avanza {
    /// Build a client without touching the network
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration is out of range
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        let negotiator = Arc::new(SessionNegotiator::new(config.clone())?);
        let gateway = Arc::new(RequestGateway::new(negotiator, Arc::new(credentials)));
        let push = PushChannelManager::new(config.clone(), Arc::clone(&gateway));
        Ok(Self {
            config,
            gateway,
            push,
        })
    }

    /// Build a client and log in
    ///
    /// # Errors
    /// Configuration or authentication errors
    pub async fn login(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        let client = Self::new(config, credentials)?;
        client.gateway.login().await?;
        info!("Avanza client ready");
        Ok(client)
    }

    /// Configuration and credentials from the environment (and `.env`)
    ///
    /// # Errors
    /// Missing variables or authentication errors
    pub async fn from_env() -> Result<Self> {
        Self::login(ClientConfig::from_env()?, Credentials::from_env()?).await
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    #[must_use]
    pub const fn push(&self) -> &PushChannelManager {
        &self.push
    }

    pub async fn session(&self) -> Option<Arc<Session>> {
        self.gateway.session().await
    }

    /// Close the push channel and drop the session locally
    pub async fn logout(&self) {
        self.push.close().await;
        self.gateway.logout().await;
    }

    /// Raw authenticated call for routes outside the catalogue
    ///
    /// # Errors
    /// See `RequestGateway::call`
    pub async fn call(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        self.gateway.call(method, path, body).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.gateway.call(HttpMethod::Get, path, None).await
    }

    // Accounts

    pub async fn overview(&self) -> Result<Value> {
        self.get(routes::OVERVIEW).await
    }

    pub async fn account_overview(&self, account_id: &str) -> Result<Value> {
        self.get(&endpoints::account_overview(account_id)).await
    }

    pub async fn positions(&self) -> Result<Value> {
        self.get(routes::POSITIONS).await
    }

    pub async fn deals_and_orders(&self) -> Result<Value> {
        self.get(routes::DEALS_AND_ORDERS).await
    }

    pub async fn transactions(&self, transaction_type: TransactionType) -> Result<Value> {
        self.get(&endpoints::transactions(transaction_type)).await
    }

    pub async fn insights_report(&self, account_id: &str, period: TimePeriod) -> Result<Value> {
        self.get(&endpoints::insights_report(account_id, period)).await
    }

    // Watchlists

    pub async fn watchlists(&self) -> Result<Value> {
        self.get(routes::WATCHLISTS).await
    }

    pub async fn add_to_watchlist(&self, instrument_id: &str, watchlist_id: &str) -> Result<Value> {
        let path = endpoints::watchlist_entry(watchlist_id, instrument_id);
        self.gateway.call(HttpMethod::Put, &path, None).await
    }

    pub async fn remove_from_watchlist(
        &self,
        instrument_id: &str,
        watchlist_id: &str,
    ) -> Result<Value> {
        let path = endpoints::watchlist_entry(watchlist_id, instrument_id);
        self.gateway.call(HttpMethod::Delete, &path, None).await
    }

    // Market data

    pub async fn instrument(
        &self,
        instrument_type: InstrumentType,
        instrument_id: &str,
    ) -> Result<Value> {
        self.get(&endpoints::instrument(instrument_type, instrument_id))
            .await
    }

    pub async fn order_book(
        &self,
        order_book_id: &str,
        instrument_type: InstrumentType,
    ) -> Result<Value> {
        self.get(&endpoints::order_book(instrument_type, order_book_id))
            .await
    }

    pub async fn order_books<S: AsRef<str>>(&self, order_book_ids: &[S]) -> Result<Value> {
        self.get(&endpoints::order_books(order_book_ids)).await
    }

    pub async fn chart_data(&self, order_book_id: &str, period: TimePeriod) -> Result<Value> {
        self.get(&endpoints::chart_data(order_book_id, period)).await
    }

    pub async fn search(
        &self,
        instrument_type: InstrumentType,
        query: &str,
        limit: u32,
    ) -> Result<Value> {
        self.get(&endpoints::search(instrument_type, query, limit))
            .await
    }

    pub async fn inspiration_lists(&self) -> Result<Value> {
        self.get(&endpoints::inspiration_lists()).await
    }

    pub async fn inspiration_list(&self, list_type: ListType) -> Result<Value> {
        self.get(&endpoints::inspiration_list(list_type)).await
    }

    // Orders

    /// Place a limit order
    ///
    /// # Errors
    /// See `RequestGateway::call`
    pub async fn place_order(&self, order: &OrderRequest) -> Result<Value> {
        let body = serde_json::to_value(order)?;
        info!(
            "Placing {} order for {} x {} @ {}",
            order.order_type, order.volume, order.order_book_id, order.price
        );
        self.gateway
            .call(HttpMethod::Post, routes::ORDER_PLACE, Some(&body))
            .await
    }

    pub async fn get_order(
        &self,
        instrument_type: InstrumentType,
        account_id: &str,
        order_id: &str,
    ) -> Result<Value> {
        self.get(&endpoints::get_order(instrument_type, account_id, order_id))
            .await
    }

    pub async fn delete_order(&self, account_id: &str, order_id: &str) -> Result<Value> {
        let path = endpoints::delete_order(account_id, order_id);
        self.gateway.call(HttpMethod::Delete, &path, None).await
    }

    // Push

    /// Subscribe one callback to `(channel, id)`, opening the push channel
    /// first if it is not connected
    ///
    /// # Errors
    /// Connection errors from `connect`, then as `PushChannelManager::subscribe`
    pub async fn subscribe_to_id<F>(
        &self,
        channel: ChannelType,
        id: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&PushMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ensure_push().await?;
        self.push.subscribe(channel, id, callback)
    }

    /// Comma-joined multi-id subscription (orders, deals, positions)
    ///
    /// # Errors
    /// As `PushChannelManager::subscribe_to_ids`
    pub async fn subscribe_to_ids<F, S>(
        &self,
        channel: ChannelType,
        ids: &[S],
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&PushMessage) -> anyhow::Result<()> + Send + Sync + 'static,
        S: AsRef<str>,
    {
        self.ensure_push().await?;
        self.push.subscribe_to_ids(channel, ids, callback)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.push.unsubscribe(handle)
    }

    #[must_use]
    pub fn push_events(&self) -> broadcast::Receiver<PushEvent> {
        self.push.events()
    }

    async fn ensure_push(&self) -> Result<()> {
        if self.push.state() != PushState::Connected {
            self.push.connect().await?;
        }
        Ok(())
    }

    /// SSE listener for a path on the REST host, carrying the session cookies
    #[must_use]
    pub fn sse_listener(&self, path: &str) -> SseListener {
        let negotiator = self.gateway.negotiator();
        SseListener::with_client(
            negotiator.streaming_client().clone(),
            self.config.url(path),
            negotiator.cookie_header(),
        )
    }

    /// Close the push channel; REST calls keep working
    pub async fn close(&self) {
        self.push.close().await;
    }
}
