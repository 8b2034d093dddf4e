use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use user_history_export::config::AppConfig;
use user_history_export::database;
use user_history_export::domains::export::ExportOrchestrator;
use user_history_export::domains::history::PgRowSource;
use user_history_export::domains::storage::{ObjectSink, OpenDalObjectSink, RetryingObjectSink};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<u8, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let pool = database::connect(&config.database, config.pool_size()).await?;
    let row_source = Arc::new(PgRowSource::new(pool.clone()));

    let storage: Arc<dyn ObjectSink> = Arc::new(OpenDalObjectSink::new(config.storage.clone()));
    let sink: Arc<dyn ObjectSink> = if config.upload_retry.max_retries > 0 {
        Arc::new(RetryingObjectSink::new(storage, config.upload_retry))
    } else {
        storage
    };

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling export run");
            ctrl_c_token.cancel();
        }
    });

    let orchestrator = ExportOrchestrator::new(row_source, sink, config.export.clone())
        .with_cancellation(cancel_token);
    let result = orchestrator.run().await;
    pool.close().await;
    let report = result?;

    println!("{}", serde_json::to_string_pretty(&report.summary())?);

    let code = report.exit_code(config.fail_on_total_failure);
    Ok(u8::try_from(code).unwrap_or(1))
}
