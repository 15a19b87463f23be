use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::Result;
use crate::error::RuloadError;
use crate::metrics::MetricsSnapshot;
use crate::runner::types::{RunConfig, Thresholds};

/// 报告产物写出接口，由外部渲染器（HTML 等）实现
pub trait ArtifactWriter: Send + Sync {
    fn write(&self, snapshot: &MetricsSnapshot, config: &RunConfig) -> Result<()>;
}

/// 最终通过/失败结论
#[derive(Debug, Clone, Serialize)]
pub struct RunVerdict {
    pub passed: bool,
    pub reasons: Vec<String>,
}

/// 用阈值评估最终快照
///
/// 个别请求失败不影响结论；只看聚合指标。
pub fn evaluate_thresholds(snapshot: &MetricsSnapshot, thresholds: &Thresholds) -> RunVerdict {
    let mut reasons = Vec::new();

    let p95 = snapshot.percentile(95.0);
    if p95 > thresholds.max_response_time_ms {
        reasons.push(format!(
            "max response time exceeded (p95 {}ms > {}ms)",
            p95, thresholds.max_response_time_ms
        ));
    }

    let error_rate = snapshot.error_rate_percent();
    if error_rate > thresholds.max_error_rate_percent {
        reasons.push(format!(
            "max error rate exceeded ({:.2}% > {:.2}%)",
            error_rate, thresholds.max_error_rate_percent
        ));
    }

    let tps = effective_tps(snapshot);
    if tps < thresholds.min_tps {
        reasons.push(format!(
            "throughput below minimum ({:.2} < {:.2} tps)",
            tps, thresholds.min_tps
        ));
    }

    RunVerdict {
        passed: reasons.is_empty(),
        reasons,
    }
}

/// 有起止时间时用全程平均，否则退回滚动窗口值
fn effective_tps(snapshot: &MetricsSnapshot) -> f64 {
    let overall = snapshot.overall_tps();
    if overall > 0.0 { overall } else { snapshot.current_tps }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    config: &'a RunConfig,
    metrics: &'a MetricsSnapshot,
    percentiles_ms: BTreeMap<&'static str, u64>,
    verdict: RunVerdict,
}

/// 内置的 JSON 产物写出器
pub struct JsonArtifactWriter {
    path: PathBuf,
}

impl JsonArtifactWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArtifactWriter for JsonArtifactWriter {
    fn write(&self, snapshot: &MetricsSnapshot, config: &RunConfig) -> Result<()> {
        let document = ReportDocument {
            config,
            metrics: snapshot,
            percentiles_ms: percentile_table(snapshot),
            verdict: evaluate_thresholds(snapshot, &config.thresholds),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(RuloadError::IoError)?;
        }

        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&self.path, json).map_err(RuloadError::IoError)?;
        Ok(())
    }
}

fn percentile_table(snapshot: &MetricsSnapshot) -> BTreeMap<&'static str, u64> {
    BTreeMap::from([
        ("p50", snapshot.percentile(50.0)),
        ("p90", snapshot.percentile(90.0)),
        ("p95", snapshot.percentile(95.0)),
        ("p99", snapshot.percentile(99.0)),
    ])
}

/// 报告发射器：把快照交给注入的写出器
pub struct ReportEmitter {
    writer: Box<dyn ArtifactWriter>,
}

impl ReportEmitter {
    pub fn new(writer: Box<dyn ArtifactWriter>) -> Self {
        Self { writer }
    }

    pub fn emit(&self, snapshot: &MetricsSnapshot, config: &RunConfig) -> Result<()> {
        self.writer.write(snapshot, config)
    }

    /// 控制台摘要
    pub fn print_summary(&self, snapshot: &MetricsSnapshot, config: &RunConfig) {
        let verdict = evaluate_thresholds(snapshot, &config.thresholds);

        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        println!(
            "  {}: {} total, {} succeeded, {} failed ({} validation)",
            "Requests".bold(),
            snapshot.total,
            snapshot.succeeded.to_string().green(),
            snapshot.failed.to_string().red(),
            snapshot.validation_failures
        );
        println!(
            "  {}: p50={}ms p90={}ms p95={}ms p99={}ms",
            "Latency".bold(),
            snapshot.percentile(50.0),
            snapshot.percentile(90.0),
            snapshot.percentile(95.0),
            snapshot.percentile(99.0),
        );
        println!(
            "  {}: {:.2} tps, error rate {:.2}%",
            "Throughput".bold(),
            effective_tps(snapshot),
            snapshot.error_rate_percent()
        );

        if verdict.passed {
            println!("  {}: {}", "Verdict".bold(), "PASS".green().bold());
        } else {
            println!("  {}: {}", "Verdict".bold(), "FAIL".red().bold());
            for reason in &verdict.reasons {
                println!("    - {}", reason);
            }
        }
        println!();
    }
}
