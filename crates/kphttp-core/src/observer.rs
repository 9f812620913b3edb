use serde_json::Value;
use tracing::debug;

/// Hook for watching raw traffic passing through the listener.
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, body: &Value);
    fn on_response(&self, body: &Value);
}

/// Logs every body at debug level on the `kphttp::traffic` target. Bodies only
/// contain ciphertext for sensitive fields, but `associate` carries the raw
/// client key, so keep this off outside of debugging sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn on_request(&self, body: &Value) {
        debug!(target: "kphttp::traffic", "<- {}", pretty(body));
    }

    fn on_response(&self, body: &Value) {
        debug!(target: "kphttp::traffic", "-> {}", pretty(body));
    }
}

fn pretty(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}
