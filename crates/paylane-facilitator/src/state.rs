/// Shared application state for the facilitator server.
pub struct AppState {
    pub facilitator: paylane::Facilitator,
    /// HMAC shared secret authenticating /verify and /settle requests.
    /// Mandatory — the server will not start without it.
    pub hmac_secret: Vec<u8>,
    /// Separate bearer token for the /metrics endpoint (not the HMAC secret).
    pub metrics_token: Option<Vec<u8>>,
}
