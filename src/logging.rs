/// Tracing setup shared by the binaries
use tracing_subscriber::EnvFilter;

/// Targets logged at the configured level: the library and every binary crate
const LOG_TARGETS: &[&str] = &["quoteflow", "read_prices", "switch"];

/// Filter used when `RUST_LOG` is unset; everything outside our targets stays at warn
pub fn default_directives(log_level: &str) -> String {
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, log_level))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// `RUST_LOG` wins when set; otherwise `default_directives`.
/// Logs go to stderr so the CLIs can print results on stdout.
/// Safe to call more than once (later calls are ignored).
pub fn init_tracing(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let result = if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
