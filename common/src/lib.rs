pub mod health;
pub mod logging;
pub mod shutdown;
pub mod tls;
