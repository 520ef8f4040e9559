//! Live check of the Avanza login flow against the real service

use auth::{Credentials, RequestGateway, SessionNegotiator, totp};
use common::{ClientConfig, HttpMethod};
use common::constants::routes;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("🚀 Testing Avanza Authentication");
    info!("{}", "=".repeat(50));

    let config = ClientConfig::from_env()?;
    let credentials = Credentials::from_env()?;

    info!("📋 Configuration:");
    info!("  Username: {}", credentials.username());
    info!("  Base URL: {}", config.base_url);
    info!("  Session timeout: {} minutes", config.max_inactive_minutes);
    info!("  TOTP window closes in {}s", totp::seconds_remaining());
    info!("");

    let negotiator = Arc::new(SessionNegotiator::new(config)?);
    let gateway = RequestGateway::new(negotiator, Arc::new(credentials));

    info!("🌐 Performing Authentication:");
    match gateway.login().await {
        Ok(session) => {
            info!("  ✅ Authentication Successful!");
            info!("  🎫 Session: {:?}", session);
            info!("");

            info!("🧪 Testing API Access:");
            let overview = gateway.call(HttpMethod::Get, routes::OVERVIEW, None).await?;
            let accounts = overview
                .get("accounts")
                .and_then(serde_json::Value::as_array)
                .map_or(0, Vec::len);
            info!("  ✅ API Access Verified ({accounts} accounts)");
        }
        Err(e) => {
            info!("  ❌ Authentication Failed: {e}");
            info!("");
            info!("📝 Troubleshooting:");
            info!("  1. Verify credentials are correct");
            info!("  2. Check TOTP secret matches authenticator app");
            info!("  3. Try again if TOTP timing was off");
            return Err(e.into());
        }
    }

    info!("");
    info!("✨ Test Complete!");
    Ok(())
}
