//! Fixture values used across test suites

/// RFC 6238 SHA1 seed ("12345678901234567890") in base32
pub const TEST_TOTP_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

/// Login accepted by the mock brokerage
pub const TEST_USERNAME: &str = "test_user";
/// Password accepted by the mock brokerage
pub const TEST_PASSWORD: &str = "correct-horse";
/// Password the mock brokerage rejects
pub const WRONG_PASSWORD: &str = "wrong-password";

/// Tokens issued by the mock brokerage
pub const TEST_AUTH_SESSION: &str = "auth-session-0001";
/// Security token returned in `X-SecurityToken`
pub const TEST_SECURITY_TOKEN: &str = "security-token-0001";
/// Push subscription id used in the CometD handshake
pub const TEST_PUSH_SUBSCRIPTION_ID: &str = "push-sub-0001";
/// Customer number
pub const TEST_CUSTOMER_ID: &str = "4711";
/// Session cookie set on login
pub const TEST_SESSION_COOKIE: &str = "csid=cookie-0001";

/// Tokens issued by the second login of a refresh
pub const REFRESHED_AUTH_SESSION: &str = "auth-session-0002";
/// Security token issued by the second login
pub const REFRESHED_SECURITY_TOKEN: &str = "security-token-0002";

/// OMXS30, the order book used in push scenarios
pub const TEST_ORDERBOOK_ID: &str = "19002";
