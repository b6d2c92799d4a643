//! Installs the process-wide rustls crypto provider. Must run once, before any
//! TLS-using client (the broker probe, the container-app driver, the state
//! store, the SMTP sink) is constructed.

pub fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs rustls provider");
}
