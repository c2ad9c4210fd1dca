use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use catalog_loadtest::{run_load_test, DslConfig};

/// Path of a JSON run configuration; the built-in baseline run otherwise.
const CONFIG_ENV: &str = "LOADTEST_CONFIG";
const BASE_URL_ENV: &str = "LOADTEST_BASE_URL";

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => match DslConfig::load(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "could not load run configuration");
                return ExitCode::from(1);
            }
        },
        None => DslConfig::default(),
    };
    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
        config.base_url = base_url;
    }

    match run_load_test(config).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!(error = %e, "load test failed");
            ExitCode::from(1)
        }
    }
}
