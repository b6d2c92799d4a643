use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "aca-controller", about = "Queue-driven container app autoscaler")]
pub struct Cli {
    /// Path to the YAML or JSON configuration file
    #[arg(long, env = "ACA_CONTROLLER_CONFIG", required = true)]
    pub config: PathBuf,

    /// Log decisions without calling the driver or notification sink
    #[arg(long, env = "ACA_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    #[clap(flatten)]
    pub logging: LoggingArgs,

    #[clap(flatten)]
    pub health: HealthArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(long = "log-format", env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    /// Port for `/healthz` and `/readyz`; 0 disables the server
    #[arg(long = "health-port", env = "HEALTH_PORT", default_value_t = 0)]
    pub health_port: u16,
}

impl HealthArgs {
    pub fn port(&self) -> Option<u16> {
        match self.health_port {
            0 => None,
            port => Some(port),
        }
    }
}
