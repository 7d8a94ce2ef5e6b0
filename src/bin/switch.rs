/// Turn the quote worker on or off
///
/// Usage: switch on|off [--scheduler]
///        switch --event '<json event>'
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde_json::json;

use quoteflow::config::load_config_from_env;
use quoteflow::control::{ControlSwitch, FileServiceScaler, JsonlNotifier, Notifier, SwitchRequest};
use quoteflow::logging::init_tracing;

const USAGE: &str = "usage: switch on|off [--scheduler] | switch --event '<json>'";

fn parse_request(mut args: impl Iterator<Item = String>) -> anyhow::Result<SwitchRequest> {
    let mut request = SwitchRequest::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--event" => {
                let raw = args.next().ok_or_else(|| anyhow!("--event needs a value\n{}", USAGE))?;
                let event: serde_json::Value = serde_json::from_str(&raw).context("parsing --event")?;
                return Ok(SwitchRequest::from_event(&event));
            }
            "--scheduler" => request.source = Some("aws.scheduler".to_string()),
            _ => request.action = Some(arg),
        }
    }

    Ok(request)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config_from_env().context("loading configuration")?;
    init_tracing(&config.log_level, &config.log_format);

    let request = parse_request(std::env::args().skip(1))?;

    let scaler = Arc::new(FileServiceScaler::new(&config.control_state_path, "stock-worker"));
    let notifier = config
        .notification_log_path
        .as_ref()
        .map(|path| Arc::new(JsonlNotifier::new(path)) as Arc<dyn Notifier>);

    let switch = ControlSwitch::new(scaler, notifier);

    match switch.toggle(&request).await {
        Ok(outcome) => {
            println!("{}", json!({ "status": "ok", "desiredCount": outcome.desired_count }));
            Ok(())
        }
        Err(e) if e.is_client_error() => {
            eprintln!("{}", json!({ "error": e.to_string() }));
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
