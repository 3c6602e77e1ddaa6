//! Server address normalization

use crate::config::GeneralConfig;

const LOOPBACK_PREFIXES: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Turn operator-entered text into a WebSocket URI
///
/// Empty input selects the configured default server. Addresses without a
/// scheme get `ws://` for loopback hosts and `wss://` otherwise, and hosts
/// listed as secure are always upgraded to `wss://`.
pub fn normalize_address(input: &str, config: &GeneralConfig) -> String {
    let input = input.trim();
    if input.is_empty() {
        return config.default_server.clone();
    }

    let mut uri = if input.starts_with("ws://") || input.starts_with("wss://") {
        input.to_string()
    } else if let Some(rest) = input.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = input.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if LOOPBACK_PREFIXES.iter().any(|p| input.starts_with(p)) {
        format!("ws://{input}")
    } else {
        format!("wss://{input}")
    };

    if let Some(rest) = uri.strip_prefix("ws://") {
        if config.secure_hosts.iter().any(|host| rest.contains(host.as_str())) {
            uri = format!("wss://{rest}");
        }
    }

    uri
}
