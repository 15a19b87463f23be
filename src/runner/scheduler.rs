use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::runner::types::{RunConfig, RunPhase};
use crate::runner::vu::VirtualUser;
use crate::runner::RunContext;

/// 调度器目标数重算周期
const TICK: Duration = Duration::from_millis(1_000);
/// 取消后等待虚拟用户退出的宽限
const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// 某时刻调度器所处的阶段
pub fn phase_at(elapsed_ms: u64, config: &RunConfig) -> RunPhase {
    let ramp_up_end = config.ramp_up_ms;
    let steady_end = ramp_up_end + config.test_duration_ms;
    let total = steady_end + config.ramp_down_ms;

    if elapsed_ms <= ramp_up_end && config.ramp_up_ms > 0 {
        RunPhase::RampUp
    } else if elapsed_ms <= steady_end {
        RunPhase::Steady
    } else if elapsed_ms <= total {
        RunPhase::RampDown
    } else {
        RunPhase::Drain
    }
}

/// 分段线性的目标 VU 数
pub fn target_vus(elapsed_ms: u64, config: &RunConfig) -> usize {
    let ramp_up_end = config.ramp_up_ms;
    let steady_end = ramp_up_end + config.test_duration_ms;
    let total = steady_end + config.ramp_down_ms;

    if elapsed_ms >= total {
        0
    } else if elapsed_ms < ramp_up_end {
        (config.max_vus as u128 * elapsed_ms as u128 / ramp_up_end as u128) as usize
    } else if elapsed_ms <= steady_end {
        config.max_vus
    } else {
        let into_ramp_down = (elapsed_ms - steady_end) as f64 / config.ramp_down_ms as f64;
        let remaining = config.max_vus as f64 * (1.0 - into_ramp_down);
        remaining.floor().max(0.0) as usize
    }
}

/// 调度器：驱动阶段状态机并维护虚拟用户池
///
/// 每秒重算目标数，不足则补启；VU 从不被杀死，降压靠停止补员，
/// 每个 VU 在下一次迭代边界自然退出。
pub struct Scheduler {
    ctx: RunContext,
}

impl Scheduler {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    /// 跑完整个生命周期：ramp-up → steady → ramp-down → drain
    ///
    /// `cancel` 置位表示外部要求提前收尾；无论正常结束还是取消，
    /// 返回前都会尽力等待虚拟用户退出（上限 10 秒）。
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let config = self.ctx.config.clone();
        let total = config.total_duration();
        let start = Instant::now();

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        let mut next_vu_id: usize = 0;
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.ctx.metrics.mark_start();
        info!(
            max_vus = config.max_vus,
            total_ms = total.as_millis() as u64,
            "Load schedule started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.wait_for(|c| *c) => {
                    info!("Cancellation requested, stopping scheduler");
                    break;
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            handles.retain(|h| !h.is_finished());
            let active = handles.len();

            let target = target_vus(elapsed.as_millis() as u64, &config);
            if active < target {
                for _ in 0..(target - active) {
                    let vu = VirtualUser::new(next_vu_id, self.ctx.clone());
                    next_vu_id += 1;
                    handles.push(tokio::spawn(vu.run(stop_rx.clone())));
                }
            }
            // 本 tick 补员之后的数量才是对外可见的活跃 VU 数
            self.ctx.metrics.set_current_vus(handles.len());
        }

        // 停止补员并通知所有 VU 在迭代边界退出
        let _ = stop_tx.send(true);
        let drain_started = Instant::now();
        let drain = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Virtual user task join error: {}", e);
                }
            }
        };
        if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
            warn!(
                waited_ms = drain_started.elapsed().as_millis() as u64,
                "Drain grace period elapsed with requests still in flight"
            );
        }

        self.ctx.metrics.set_current_vus(0);
        self.ctx.metrics.mark_end();
        info!(vus_launched = next_vu_id, "Load schedule finished");
    }
}
