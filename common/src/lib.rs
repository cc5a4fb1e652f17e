pub mod access_log;
pub mod cors;
pub mod shutdown;
pub mod state;

/// Process-wide setup shared by every binary. Call before anything opens a
/// TLS connection: reqwest and axum both link rustls, and exactly one
/// crypto provider must be installed for the process.
pub fn init() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
