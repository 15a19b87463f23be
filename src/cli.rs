use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio::sync::watch;
use tracing::{info, warn};

use ruload::collection::{CollectionLoader, JsonCollectionLoader, JsonRowLoader, RowLoader};
use ruload::config::RunSettings;
use ruload::http::HttpExecutor;
use ruload::metrics::MetricsAggregator;
use ruload::report::{FailureLogger, JsonArtifactWriter, ReportEmitter};
use ruload::runner::monitor::run_monitor;
use ruload::runner::{AuthSequence, RunContext, Scheduler};
use ruload::variable::ColumnMapping;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 运行设置文件（TOML）
    pub config: String,

    /// 跳过交互确认直接开始
    #[arg(long)]
    pub yes: bool,
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = RunSettings::load_from_path(&cli.config)?;
    settings.validate()?;

    let collection = Arc::new(
        JsonCollectionLoader.load(Path::new(&settings.postman_collection_path))?,
    );
    let rows = Arc::new(JsonRowLoader.load(Path::new(&settings.csv_data_path))?);
    let mapping: Arc<ColumnMapping> = Arc::new(serde_json::from_str(&std::fs::read_to_string(
        &settings.column_mapping_path,
    )?)?);

    let config = Arc::new(settings.to_run_config());

    print_plan(&settings, rows.len(), collection.len());
    if !cli.yes && !confirm_start()? {
        println!("Aborted.");
        return Ok(());
    }

    // 失败日志目录放在报告旁边
    let report_path = Path::new(&settings.output_settings.html_report_path);
    let failure_dir = report_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("failures");
    let failure_log = Arc::new(FailureLogger::new(failure_dir));

    let executor = Arc::new(
        HttpExecutor::new(&settings.client_settings())?.with_failure_log(failure_log.clone()),
    );
    let metrics = Arc::new(MetricsAggregator::new());

    let auth = if settings.execution_settings.auth_prelude_steps.is_empty() {
        None
    } else {
        Some(Arc::new(AuthSequence::new(
            settings.execution_settings.auth_prelude_steps.clone(),
        )))
    };

    let ctx = RunContext {
        collection,
        rows,
        mapping,
        config: config.clone(),
        executor,
        metrics: metrics.clone(),
        auth,
    };

    // SIGINT 触发协作式取消
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("SIGINT received, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    // 周期性控制台刷新
    let (monitor_tx, monitor_rx) = watch::channel(false);
    let monitor_handle = tokio::spawn(run_monitor(
        ctx.clone(),
        Duration::from_millis(settings.output_settings.console_update_interval_ms),
        monitor_rx,
    ));

    Scheduler::new(ctx).run(cancel_rx).await;

    let _ = monitor_tx.send(true);
    let _ = monitor_handle.await;

    // 取消也照样出报告
    let snapshot = metrics.snapshot();
    let emitter = ReportEmitter::new(Box::new(JsonArtifactWriter::new(report_path)));
    emitter.emit(&snapshot, &config)?;
    emitter.print_summary(&snapshot, &config);
    info!(report = %settings.output_settings.html_report_path, "Report written");

    Ok(())
}

fn print_plan(settings: &RunSettings, row_count: usize, template_count: usize) {
    let exec = &settings.execution_settings;
    let perf = &settings.performance_settings;

    println!("\n{}", "Load test plan".bold());
    println!(
        "  phases: ramp-up {}ms → steady {}ms → ramp-down {}ms",
        exec.ramp_up_time_ms, exec.test_duration_ms, exec.ramp_down_time_ms
    );
    println!(
        "  load: {} max VUs, target {} tps, timeout {}ms",
        perf.max_concurrent_users, perf.target_transactions_per_second, perf.request_timeout_ms
    );
    println!(
        "  inputs: {} templates, {} data rows",
        template_count, row_count
    );
    let steps: Vec<_> = exec
        .iteration_settings
        .iter()
        .filter(|s| s.enabled)
        .map(|s| s.step_name.as_str())
        .collect();
    println!("  steps: {}", steps.join(" → "));
}

fn confirm_start() -> Result<bool> {
    print!("Start the load test? [y/N] ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let answer = line.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
