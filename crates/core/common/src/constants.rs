//! Wire constants: hosts, headers, routes and protocol limits

/// REST host
pub const BASE_URL: &str = "https://www.avanza.se";

/// CometD push endpoint
pub const PUSH_URL: &str = "wss://www.avanza.se/_push/cometd";

/// Header carrying the security token returned by the second factor step
pub const SECURITY_TOKEN_HEADER: &str = "X-SecurityToken";

/// Header carrying the authentication session id
pub const AUTHENTICATION_SESSION_HEADER: &str = "X-AuthenticationSession";

/// Allowed range for `maxInactiveMinutes`
pub const MIN_INACTIVE_MINUTES: u32 = 30;
/// Upper bound for `maxInactiveMinutes` (one day)
pub const MAX_INACTIVE_MINUTES: u32 = 60 * 24;

/// TOTP parameters
pub const TOTP_DIGITS: usize = 6;
/// TOTP window length in seconds
pub const TOTP_STEP_SECS: u64 = 30;
/// Only second factor method supported by the login flow
pub const TOTP_METHOD: &str = "TOTP";

/// Route templates. `{}` placeholders are filled positionally.
pub mod routes {
    pub const AUTHENTICATION: &str = "/_api/authentication/sessions/usercredentials";
    pub const TOTP: &str = "/_api/authentication/sessions/totp";

    pub const POSITIONS: &str = "/_mobile/account/positions";
    pub const OVERVIEW: &str = "/_mobile/account/overview";
    pub const ACCOUNT_OVERVIEW: &str = "/_mobile/account/{}/overview";
    pub const DEALS_AND_ORDERS: &str = "/_mobile/account/dealsandorders";
    pub const WATCHLISTS: &str = "/_mobile/usercontent/watchlist";
    pub const WATCHLISTS_ADD_DELETE: &str = "/_api/usercontent/watchlist/{}/orderbooks/{}";
    pub const INSTRUMENT: &str = "/_mobile/market/{}/{}";
    pub const ORDERBOOK: &str = "/_mobile/order/{}?orderbookId={}";
    pub const ORDERBOOK_LIST: &str = "/_mobile/market/orderbooklist/{}";
    pub const CHARTDATA: &str = "/_mobile/chart/orderbook/{}?timePeriod={}";
    pub const ORDER_PLACE: &str = "/_api/order";
    pub const ORDER_GET: &str = "/_mobile/order/{}?accountId={}&orderId={}";
    pub const ORDER_DELETE: &str = "/_api/order?accountId={}&orderId={}";
    pub const SEARCH: &str = "/_mobile/market/search/{}?query={}&limit={}";
    pub const INSPIRATION_LIST: &str = "/_mobile/marketing/inspirationlist/{}";
    pub const TRANSACTIONS: &str = "/_mobile/account/transactions/{}";
    pub const INSIGHTS: &str = "/_cqbe/insights/?timePeriod={}&accountIds={}";
}

/// CometD meta channels
pub mod meta {
    pub const HANDSHAKE: &str = "/meta/handshake";
    pub const CONNECT: &str = "/meta/connect";
    pub const DISCONNECT: &str = "/meta/disconnect";
    pub const SUBSCRIBE: &str = "/meta/subscribe";
    pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";
}

/// Fill `{}` placeholders of a route template in order.
///
/// Extra arguments are ignored, missing ones leave the placeholder empty.
#[must_use]
pub fn format_route(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        if let Some(arg) = args.next() {
            out.push_str(arg);
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
