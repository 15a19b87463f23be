use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::runner::RunContext;
use crate::runner::step::run_template_step;
use crate::variable::VariableContext;

/// 迭代尾部的随机抖动上限（毫秒）
const ITERATION_JITTER_MS: u64 = 1_000;

/// 虚拟用户：独立的迭代循环
///
/// 每个 VU 持有自己的变量上下文和独立种子的随机数发生器，
/// 每次迭代重新随机选取数据行，绝不把某一行绑死在某个 VU 上。
pub struct VirtualUser {
    id: usize,
    ctx: RunContext,
    vars: VariableContext,
    rng: StdRng,
    warned: HashSet<String>,
}

impl VirtualUser {
    pub fn new(id: usize, ctx: RunContext) -> Self {
        Self {
            id,
            ctx,
            vars: VariableContext::new(),
            rng: StdRng::from_entropy(),
            warned: HashSet::new(),
        }
    }

    /// 集合全局变量 ⊕ 列映射全局变量（后者覆盖前者）
    fn base_variables(&self) -> HashMap<String, String> {
        let mut base = self.ctx.collection.globals.clone();
        base.extend(self.ctx.mapping.global_variables());
        base
    }

    /// 为本次迭代重建变量层：全局 ⊕ 新选数据行
    fn bind_fresh_row(&mut self) {
        let mut layer = self.base_variables();
        if !self.ctx.rows.is_empty() {
            let index = self.rng.gen_range(0..self.ctx.rows.len());
            layer.extend(self.ctx.mapping.apply_row(&self.ctx.rows[index]));
        }
        self.vars.rebind(layer);
    }

    /// 迭代直到收到停止信号；在步骤边界自然退出
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        debug!(vu = self.id, "Virtual user started");
        let steps = self.ctx.config.steps.clone();

        'iterations: loop {
            if *stop.borrow() {
                break;
            }

            self.bind_fresh_row();

            for step in steps.iter().filter(|s| s.enabled) {
                if *stop.borrow() {
                    break 'iterations;
                }

                let Some(template) = self.ctx.collection.get(&step.step_name) else {
                    if self.warned.insert(format!("step:{}", step.step_name)) {
                        warn!(step = %step.step_name, "Step not found in collection, skipping");
                    }
                    continue;
                };

                if let Some(auth) = self.ctx.auth.clone() {
                    auth.ensure(&self.ctx, template, &mut self.vars, &mut self.warned)
                        .await;
                }

                let criteria = self.ctx.config.criteria_for(step).clone();
                run_template_step(&self.ctx, template, &criteria, &mut self.vars, &mut self.warned)
                    .await;

                if step.inter_step_delay_ms > 0
                    && sleep_cancellable(
                        Duration::from_millis(step.inter_step_delay_ms),
                        &mut stop,
                    )
                    .await
                {
                    break 'iterations;
                }
            }

            let jitter = self.rng.gen_range(0..ITERATION_JITTER_MS);
            if sleep_cancellable(Duration::from_millis(jitter), &mut stop).await {
                break;
            }
        }

        debug!(vu = self.id, "Virtual user exited");
    }
}

/// 可取消的睡眠，返回 true 表示收到停止信号
pub(crate) async fn sleep_cancellable(
    duration: Duration,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stop.wait_for(|s| *s) => true,
    }
}
