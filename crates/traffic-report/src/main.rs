mod bootstrap;
mod report;

use anyhow::{Context as _, Result};
use traffic_core::settings::Settings;
use traffic_data::reader::load_usage_records;
use traffic_runtime::client::AggregationClient;
use traffic_runtime::worker::AggregationWorker;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Traffic report v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Threshold: {} B, max users: {}, granularity: {}, timezone: {}",
        settings.threshold,
        settings.max_users,
        settings.granularity,
        settings.timezone
    );

    let Some(input) = settings.input.clone() else {
        anyhow::bail!("no usage export given; pass --input <FILE|DIR>");
    };

    let records = load_usage_records(&input)
        .with_context(|| format!("loading usage export {}", input.display()))?;
    tracing::info!("Loaded {} usage records", records.len());

    let params = settings.aggregation_parameters();
    let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());

    let outcome = tokio::select! {
        outcome = async {
            let id = client.submit(records, params).await?;
            let result = client.next_latest().await?;
            Ok::<_, traffic_core::error::TrafficError>((id, result))
        } => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; stopping aggregation worker");
            handle.abort();
            return Ok(());
        }
    };
    handle.abort();

    let (id, result) = outcome.context("aggregating usage records")?;

    let rendered = match settings.format.as_str() {
        "json" => report::render_json(id, result)?,
        _ => report::render_table(&result),
    };
    println!("{}", rendered);

    Ok(())
}
