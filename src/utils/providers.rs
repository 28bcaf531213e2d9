use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use eyre::Result;
use log::info;
use url::Url;

/// Creates a read-only provider for `url`.
///
/// `ws://` and `wss://` URLs get a WebSocket connection, anything else is treated as HTTP.
///
/// # Arguments
/// * `url` - The node endpoint
///
/// # Returns
/// A type-erased provider usable for contract calls
///
/// # Errors
/// * If the WebSocket handshake fails
pub async fn create_provider(url: &Url) -> Result<DynProvider> {
    match url.scheme() {
        "ws" | "wss" => {
            info!("Using WebSocket provider at {url}");
            let ws = WsConnect::new(url.as_str());
            Ok(ProviderBuilder::new().on_ws(ws).await?.erased())
        }
        _ => {
            info!("Using HTTP provider at {url}");
            Ok(ProviderBuilder::new().on_http(url.clone()).erased())
        }
    }
}
