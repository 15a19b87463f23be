pub mod auth;
pub mod monitor;
pub mod scheduler;
pub mod step;
pub mod types;
pub mod vu;

use std::sync::Arc;

use crate::collection::{DataRow, RequestCollection};
use crate::http::HttpExecutor;
use crate::metrics::MetricsAggregator;
use crate::variable::ColumnMapping;

pub use auth::AuthSequence;
pub use scheduler::{Scheduler, phase_at, target_vus};
pub use types::{ExecutionResult, RunConfig, RunPhase, StepPlan, Thresholds};
pub use vu::VirtualUser;

/// 一次压测运行的共享依赖，克隆开销只有引用计数
#[derive(Clone)]
pub struct RunContext {
    pub collection: Arc<RequestCollection>,
    pub rows: Arc<Vec<DataRow>>,
    pub mapping: Arc<ColumnMapping>,
    pub config: Arc<RunConfig>,
    pub executor: Arc<HttpExecutor>,
    pub metrics: Arc<MetricsAggregator>,
    pub auth: Option<Arc<AuthSequence>>,
}
