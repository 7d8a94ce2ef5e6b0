/// Query stored prices for one symbol
///
/// Usage: read_prices SYMBOL [1D|1W|1M] [--source hot|archive] [--csv]
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use tracing::info;

use quoteflow::archive::{ArchiveReader, FsObjectStore};
use quoteflow::config::load_config_from_env;
use quoteflow::data::FileHotStore;
use quoteflow::logging::init_tracing;
use quoteflow::query::{PointSource, QueryService};
use quoteflow::{Config, DataSource, PriceSeries};

const USAGE: &str = "usage: read_prices SYMBOL [1D|1W|1M] [--source hot|archive] [--csv]";

struct Args {
    params: HashMap<String, String>,
    source: Option<DataSource>,
    csv: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut params = HashMap::new();
    let mut source = None;
    let mut csv = false;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csv" => csv = true,
            "--source" => {
                let value = args.next().ok_or_else(|| anyhow!("--source needs a value\n{}", USAGE))?;
                source = Some(
                    value
                        .parse::<DataSource>()
                        .map_err(|e| anyhow!("{}\n{}", e, USAGE))?,
                );
            }
            "-h" | "--help" => bail!(USAGE),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    if let Some(symbol) = positional.next() {
        params.insert("symbol".to_string(), symbol);
    }
    if let Some(range) = positional.next() {
        params.insert("range".to_string(), range);
    }

    Ok(Args { params, source, csv })
}

async fn build_service(config: &Config, source: DataSource) -> anyhow::Result<QueryService> {
    let service = match source {
        DataSource::Hot => {
            let path = config
                .hot_store_path
                .as_ref()
                .context("hot_store_path is not configured")?;
            let store = FileHotStore::new(PathBuf::from(path), config.hot_store_page_size);
            let loaded = store.load_from_disk().await?;
            info!("Loaded {} hot records from {}", loaded, path);
            QueryService::new(PointSource::Hot(Arc::new(store)))
        }
        DataSource::Archive => {
            let store = Arc::new(FsObjectStore::new(&config.archive_root));
            QueryService::new(PointSource::Archive(ArchiveReader::new(
                store,
                config.archive_prefix.clone(),
            )))
        }
    };
    Ok(service)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    symbol: &'a str,
    t: String,
    price: f64,
}

fn write_csv(series: &PriceSeries) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for point in &series.points {
        writer.serialize(CsvRow {
            symbol: &series.symbol,
            t: point.t.to_rfc3339(),
            price: point.price,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config_from_env().context("loading configuration")?;
    init_tracing(&config.log_level, &config.log_format);

    let args = parse_args(std::env::args().skip(1))?;
    let source = args.source.unwrap_or_else(|| config.data_source());
    let service = build_service(&config, source).await?;

    let series = match service.handle(&args.params).await {
        Ok(series) => series,
        Err(e) if e.is_client_error() => {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    if args.csv {
        write_csv(&series)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&series)?);
    }

    Ok(())
}
