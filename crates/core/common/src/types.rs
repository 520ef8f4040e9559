//! Enumerations used on the wire

use crate::errors::AvanzaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// All variants in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire representation
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AvanzaError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .copied()
                    .ok_or_else(|| {
                        AvanzaError::InvalidConfig(format!(
                            "unknown {} '{}'",
                            stringify!($name),
                            s
                        ))
                    })
            }
        }
    };
}

wire_enum! {
    /// Push channels
    ChannelType {
        /// Account balance updates
        Accounts => "accounts",
        /// Quote ticks for an order book
        Quotes => "quotes",
        /// Order depth levels
        OrderDepths => "orderdepths",
        /// Public trades
        Trades => "trades",
        /// Broker trade summary
        BrokerTradeSummary => "brokertradesummary",
        /// Own positions
        Positions => "positions",
        /// Own orders
        Orders => "orders",
        /// Own deals
        Deals => "deals",
    }
}

impl ChannelType {
    /// Channels that accept several comma-joined ids in one subscription
    #[must_use]
    pub const fn supports_multiple_ids(&self) -> bool {
        matches!(self, Self::Orders | Self::Deals | Self::Positions)
    }
}

wire_enum! {
    /// Instrument classes used in market routes
    InstrumentType {
        Stock => "stock",
        Fund => "fund",
        Bond => "bond",
        OptionContract => "option",
        FutureForward => "future_forward",
        Certificate => "certificate",
        Warrant => "warrant",
        ExchangeTradedFund => "exchange_traded_fund",
        Index => "index",
        PremiumBond => "premium_bond",
        SubscriptionOption => "subscription_option",
        EquityLinkedBond => "equity_linked_bond",
        Convertible => "convertible",
    }
}

wire_enum! {
    /// Chart and insight periods
    TimePeriod {
        Today => "TODAY",
        OneWeek => "ONE_WEEK",
        OneMonth => "ONE_MONTH",
        ThreeMonths => "THREE_MONTHS",
        ThisYear => "THIS_YEAR",
        OneYear => "ONE_YEAR",
        FiveYears => "FIVE_YEARS",
    }
}

wire_enum! {
    /// Marketing inspiration lists
    ListType {
        HighestRatedFunds => "HIGHEST_RATED_FUNDS",
        LowestFeeIndexFunds => "LOWEST_FEE_INDEX_FUNDS",
        BestDevelopmentFundsLastThreeMonths => "BEST_DEVELOPMENT_FUNDS_LAST_THREE_MONTHS",
        MostOwnedFunds => "MOST_OWNED_FUNDS",
    }
}

wire_enum! {
    /// Transaction filters
    TransactionType {
        Options => "options",
        Forex => "forex",
        DepositWithdraw => "deposit-withdraw",
        BuySell => "buy-sell",
        Dividend => "dividend",
        Interest => "interest",
        ForeignTax => "foreign-tax",
    }
}

wire_enum! {
    /// Order side
    OrderType {
        Buy => "BUY",
        Sell => "SELL",
    }
}

wire_enum! {
    /// HTTP verbs accepted by the request gateway
    HttpMethod {
        Get => "GET",
        Post => "POST",
        Put => "PUT",
        Delete => "DELETE",
    }
}
