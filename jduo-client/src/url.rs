//! Server address normalisation

/// Turn a user-supplied address into a WebSocket URL
///
/// `ws://` and `wss://` pass through, `http://` and `https://` map onto their WebSocket
/// counterparts, and a bare `host:port` is taken as plain `ws://`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else {
        format!("ws://{}", url)
    }
}
