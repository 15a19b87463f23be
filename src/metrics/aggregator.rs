use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::types::ExecutionResult;

/// 延迟样本上限，超出后丢弃最旧样本
const MAX_SAMPLES: usize = 10_000;
/// 最近结果环形缓冲大小
const MAX_RECENT: usize = 50;
/// 滚动 TPS 的观察窗口（秒）
const TPS_WINDOW_SECS: i64 = 10;

#[derive(Default)]
struct MetricsInner {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    total: u64,
    succeeded: u64,
    failed: u64,
    validation_failures: u64,
    all_samples: VecDeque<u64>,
    per_step_samples: HashMap<String, VecDeque<u64>>,
    recent_results: VecDeque<ExecutionResult>,
    tps_window: VecDeque<DateTime<Utc>>,
    current_vus: usize,
}

/// 线程安全的指标聚合器
///
/// 所有写操作在一把粗粒度锁下完成且为 O(1)；record 返回即保证
/// 计数器与样本一致，快照是某一时刻的完整深拷贝。
pub struct MetricsAggregator {
    inner: Mutex<MetricsInner>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 标记压测开始时间
    pub fn mark_start(&self) {
        let mut inner = self.lock();
        inner.start = Some(Utc::now());
    }

    /// 标记压测结束时间
    pub fn mark_end(&self) {
        let mut inner = self.lock();
        inner.end = Some(Utc::now());
    }

    /// 记录一次执行结果
    pub fn record(&self, result: &ExecutionResult) {
        let mut inner = self.lock();

        inner.total += 1;
        if result.is_success {
            inner.succeeded += 1;
        } else {
            inner.failed += 1;
            if result.is_validation_failure() {
                inner.validation_failures += 1;
            }
        }

        push_capped(&mut inner.all_samples, result.response_time_ms, MAX_SAMPLES);
        let step_samples = inner
            .per_step_samples
            .entry(result.step_name.clone())
            .or_default();
        push_capped(step_samples, result.response_time_ms, MAX_SAMPLES);

        if inner.recent_results.len() == MAX_RECENT {
            inner.recent_results.pop_front();
        }
        inner.recent_results.push_back(result.clone());

        let now = result.captured_at;
        inner.tps_window.push_back(now);
        prune_tps_window(&mut inner.tps_window, now);
    }

    /// 更新当前活跃虚拟用户数
    pub fn set_current_vus(&self, vus: usize) {
        let mut inner = self.lock();
        inner.current_vus = vus;
    }

    /// 最近 10 秒窗口内的平均每秒事务数
    pub fn current_tps(&self) -> f64 {
        let mut inner = self.lock();
        let now = Utc::now();
        prune_tps_window(&mut inner.tps_window, now);
        inner.tps_window.len() as f64 / TPS_WINDOW_SECS as f64
    }

    /// 全量样本的百分位（毫秒）
    pub fn percentile(&self, p: f64) -> u64 {
        let inner = self.lock();
        percentile_of(inner.all_samples.iter().copied(), p)
    }

    /// 导出某一时刻的完整快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut inner = self.lock();
        let now = Utc::now();
        prune_tps_window(&mut inner.tps_window, now);

        MetricsSnapshot {
            start: inner.start,
            end: inner.end,
            total: inner.total,
            succeeded: inner.succeeded,
            failed: inner.failed,
            validation_failures: inner.validation_failures,
            all_samples: inner.all_samples.iter().copied().collect(),
            current_vus: inner.current_vus,
            current_tps: inner.tps_window.len() as f64 / TPS_WINDOW_SECS as f64,
            per_step_samples: inner
                .per_step_samples
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
                .collect(),
            recent_results: inner.recent_results.iter().cloned().collect(),
        }
    }
}

fn push_capped(samples: &mut VecDeque<u64>, value: u64, cap: usize) {
    if samples.len() == cap {
        samples.pop_front();
    }
    samples.push_back(value);
}

fn prune_tps_window(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - ChronoDuration::seconds(TPS_WINDOW_SECS);
    while let Some(oldest) = window.front() {
        if *oldest < cutoff {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// 排序后取 ceil(n*p/100)-1 位置的元素，空样本返回 0
fn percentile_of(samples: impl Iterator<Item = u64>, p: f64) -> u64 {
    let mut sorted: Vec<u64> = samples.collect();
    if sorted.is_empty() {
        return 0;
    }
    sorted.sort_unstable();
    let n = sorted.len();
    let rank = (n as f64 * p / 100.0).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}

/// 聚合器某一时刻的一致性拷贝
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub validation_failures: u64,
    pub all_samples: Vec<u64>,
    pub current_vus: usize,
    pub current_tps: f64,
    pub per_step_samples: HashMap<String, Vec<u64>>,
    pub recent_results: Vec<ExecutionResult>,
}

impl MetricsSnapshot {
    pub fn percentile(&self, p: f64) -> u64 {
        percentile_of(self.all_samples.iter().copied(), p)
    }

    /// 失败占比（百分数），无样本时为 0
    pub fn error_rate_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 * 100.0 / self.total as f64
        }
    }

    /// 整个运行期间的平均 TPS
    pub fn overall_tps(&self) -> f64 {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return 0.0;
        };
        let secs = (end - start).num_milliseconds() as f64 / 1000.0;
        if secs <= 0.0 {
            0.0
        } else {
            self.total as f64 / secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn success(step: &str, ms: u64) -> ExecutionResult {
        let response = crate::http::ResponseData::new(
            200,
            reqwest::header::HeaderMap::new(),
            b"ok".to_vec(),
            Duration::from_millis(ms),
        );
        ExecutionResult::completed(
            step,
            "GET",
            "http://x/ping",
            &response,
            crate::validator::ValidationVerdict::pass(),
        )
    }

    fn validation_failure(step: &str, ms: u64) -> ExecutionResult {
        let response = crate::http::ResponseData::new(
            200,
            reqwest::header::HeaderMap::new(),
            b"bad".to_vec(),
            Duration::from_millis(ms),
        );
        ExecutionResult::completed(
            step,
            "GET",
            "http://x/ping",
            &response,
            crate::validator::ValidationVerdict::fail(vec!["$.ok: mismatch".to_string()]),
        )
    }

    #[test]
    fn test_counter_conservation() {
        let metrics = MetricsAggregator::new();
        for i in 0..20 {
            if i % 3 == 0 {
                metrics.record(&validation_failure("ping", 10));
            } else {
                metrics.record(&success("ping", 10));
            }
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 20);
        assert_eq!(snapshot.total, snapshot.succeeded + snapshot.failed);
        assert!(snapshot.validation_failures <= snapshot.failed);
        assert_eq!(snapshot.validation_failures, 7);
    }

    #[test]
    fn test_transport_failure_not_counted_as_validation_failure() {
        let metrics = MetricsAggregator::new();
        metrics.record(&ExecutionResult::transport_failure(
            "ping",
            "GET",
            "http://x",
            "refused",
            Duration::from_millis(1),
        ));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.validation_failures, 0);
    }

    #[test]
    fn test_sample_cap_drops_oldest() {
        let metrics = MetricsAggregator::new();
        for i in 0..(MAX_SAMPLES as u64 + 100) {
            metrics.record(&success("ping", i));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.all_samples.len(), MAX_SAMPLES);
        // 最旧的 100 个被丢弃
        assert_eq!(snapshot.all_samples[0], 100);
        assert_eq!(snapshot.total, MAX_SAMPLES as u64 + 100);
    }

    #[test]
    fn test_recent_results_ring() {
        let metrics = MetricsAggregator::new();
        for _ in 0..80 {
            metrics.record(&success("ping", 5));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.recent_results.len(), MAX_RECENT);
    }

    #[test]
    fn test_percentile_formula() {
        let metrics = MetricsAggregator::new();
        for ms in [10, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
            metrics.record(&success("ping", ms));
        }

        // ceil(10*50/100)-1 = 4 → 50
        assert_eq!(metrics.percentile(50.0), 50);
        // ceil(10*95/100)-1 = 9 → 100
        assert_eq!(metrics.percentile(95.0), 100);
        assert_eq!(metrics.percentile(0.0), 10);
        assert_eq!(metrics.percentile(100.0), 100);
    }

    #[test]
    fn test_percentile_empty_returns_zero() {
        let metrics = MetricsAggregator::new();
        assert_eq!(metrics.percentile(95.0), 0);
    }

    #[test]
    fn test_percentile_monotonic() {
        let metrics = MetricsAggregator::new();
        for ms in [3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5] {
            metrics.record(&success("ping", ms));
        }

        let ps = [0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 99.0, 100.0];
        for pair in ps.windows(2) {
            assert!(
                metrics.percentile(pair[0]) <= metrics.percentile(pair[1]),
                "percentile({}) > percentile({})",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_per_step_samples() {
        let metrics = MetricsAggregator::new();
        metrics.record(&success("login", 10));
        metrics.record(&success("login", 20));
        metrics.record(&success("profile", 30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.per_step_samples["login"], vec![10, 20]);
        assert_eq!(snapshot.per_step_samples["profile"], vec![30]);
    }

    #[test]
    fn test_rolling_tps_counts_recent_window() {
        let metrics = MetricsAggregator::new();
        for _ in 0..30 {
            metrics.record(&success("ping", 1));
        }

        // 刚记录的 30 条都在 10 秒窗口内
        let tps = metrics.current_tps();
        assert!((tps - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let metrics = MetricsAggregator::new();
        metrics.record(&success("ping", 10));

        let snapshot = metrics.snapshot();
        metrics.record(&success("ping", 20));

        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.all_samples.len(), 1);
    }

    #[test]
    fn test_error_rate_and_vus() {
        let metrics = MetricsAggregator::new();
        metrics.set_current_vus(7);
        for _ in 0..3 {
            metrics.record(&success("ping", 5));
        }
        metrics.record(&validation_failure("ping", 5));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.current_vus, 7);
        assert!((snapshot.error_rate_percent() - 25.0).abs() < f64::EPSILON);
    }
}
