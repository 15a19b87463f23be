use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::sync::watch;

use crate::runner::RunContext;
use crate::runner::scheduler::phase_at;

/// 周期性向控制台输出运行状态，直到收到停止信号
pub async fn run_monitor(ctx: RunContext, interval: Duration, mut stop: watch::Receiver<bool>) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    // 第一个 tick 立即触发，跳过它避免 0 秒输出
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.wait_for(|s| *s) => break,
        }

        let elapsed = start.elapsed();
        let snapshot = ctx.metrics.snapshot();
        let phase = phase_at(elapsed.as_millis() as u64, &ctx.config);
        let error_rate = snapshot.error_rate_percent();

        let error_text = format!("{:.1}%", error_rate);
        let error_colored = if error_rate > 0.0 {
            error_text.red()
        } else {
            error_text.green()
        };

        println!(
            " {} {:>4}s | {:9} | vus={:<3} total={:<6} errors={} tps={:.1} p95={}ms",
            "▸".cyan(),
            elapsed.as_secs(),
            phase.to_string(),
            snapshot.current_vus,
            snapshot.total,
            error_colored,
            snapshot.current_tps,
            snapshot.percentile(95.0),
        );
    }
}
