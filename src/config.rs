use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::Result;
use crate::error::RuloadError;
use crate::http::ClientSettings;
use crate::runner::types::{RunConfig, StepPlan, Thresholds};
use crate::validator::SuccessCriteria;

/// 运行设置文档（TOML）
///
/// 键名沿用原配置约定的 PascalCase。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSettings {
    /// 请求集合文件（已转换为本 crate 数据模型的 JSON）
    pub postman_collection_path: String,

    /// 数据行文件（JSON 数组）
    pub csv_data_path: String,

    /// 列映射文件（JSON）
    pub column_mapping_path: String,

    #[serde(default)]
    pub output_settings: OutputSettings,

    #[serde(default)]
    pub execution_settings: ExecutionSettings,

    #[serde(default)]
    pub performance_settings: PerformanceSettings,

    #[serde(default)]
    pub thresholds: ThresholdSettings,

    #[serde(default)]
    pub global_success_criteria: GlobalCriteriaSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputSettings {
    pub html_report_path: String,

    pub console_update_interval_ms: u64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            html_report_path: "report/loadtest-report.json".to_string(),
            console_update_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionSettings {
    #[serde(default = "default_test_duration")]
    pub test_duration_ms: u64,

    #[serde(default)]
    pub ramp_up_time_ms: u64,

    #[serde(default)]
    pub ramp_down_time_ms: u64,

    /// 迭代内按序执行的步骤
    #[serde(default)]
    pub iteration_settings: Vec<IterationSetting>,

    /// 认证前置步骤名，按执行顺序
    #[serde(default)]
    pub auth_prelude_steps: Vec<String>,
}

fn default_test_duration() -> u64 {
    60_000
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            test_duration_ms: default_test_duration(),
            ramp_up_time_ms: 0,
            ramp_down_time_ms: 0,
            iteration_settings: Vec::new(),
            auth_prelude_steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IterationSetting {
    pub step_name: String,

    #[serde(default)]
    pub interval_ms: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub success_criteria: Option<SuccessCriteria>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PerformanceSettings {
    pub target_transactions_per_second: f64,

    pub max_concurrent_users: usize,

    pub request_timeout_ms: u64,

    /// 保留字段：当前核心不做自动重试
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            target_transactions_per_second: 10.0,
            max_concurrent_users: 10,
            request_timeout_ms: 30_000,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThresholdSettings {
    pub max_response_time_ms: u64,
    pub max_error_rate_percent: f64,
    pub min_transactions_per_second: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            max_response_time_ms: 5_000,
            max_error_rate_percent: 5.0,
            min_transactions_per_second: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalCriteriaSettings {
    #[serde(default = "default_status_codes")]
    pub default_http_status_codes: Vec<u16>,

    #[serde(default)]
    pub default_response_time_max_ms: Option<u64>,

    #[serde(default)]
    pub ignore_ssl_errors: bool,

    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_status_codes() -> Vec<u16> {
    vec![200, 201, 202, 204]
}

fn default_max_redirects() -> usize {
    10
}

impl Default for GlobalCriteriaSettings {
    fn default() -> Self {
        Self {
            default_http_status_codes: default_status_codes(),
            default_response_time_max_ms: None,
            ignore_ssl_errors: false,
            follow_redirects: true,
            max_redirects: default_max_redirects(),
        }
    }
}

impl RunSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RuloadError::ConfigError(e.to_string()))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// 启动前校验；任何一条不满足都是致命错误
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.postman_collection_path.trim().is_empty() {
            problems.push("PostmanCollectionPath is empty".to_string());
        }
        if self.csv_data_path.trim().is_empty() {
            problems.push("CsvDataPath is empty".to_string());
        }
        if self.column_mapping_path.trim().is_empty() {
            problems.push("ColumnMappingPath is empty".to_string());
        }
        if self.execution_settings.test_duration_ms == 0 {
            problems.push("TestDurationMs must be positive".to_string());
        }
        if self.performance_settings.max_concurrent_users == 0 {
            problems.push("MaxConcurrentUsers must be positive".to_string());
        }
        if self.performance_settings.target_transactions_per_second <= 0.0 {
            problems.push("TargetTransactionsPerSecond must be positive".to_string());
        }
        if self.performance_settings.request_timeout_ms == 0 {
            problems.push("RequestTimeoutMs must be positive".to_string());
        }
        if !self
            .execution_settings
            .iteration_settings
            .iter()
            .any(|s| s.enabled)
        {
            problems.push("IterationSettings has no enabled step".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RuloadError::ConfigError(problems.join("; ")))
        }
    }

    /// 折算为调度器使用的有效配置
    pub fn to_run_config(&self) -> RunConfig {
        let steps = self
            .execution_settings
            .iteration_settings
            .iter()
            .map(|s| StepPlan {
                step_name: s.step_name.clone(),
                inter_step_delay_ms: s.interval_ms,
                enabled: s.enabled,
                criteria: s.success_criteria.clone(),
            })
            .collect();

        let global = &self.global_success_criteria;
        let global_criteria = SuccessCriteria {
            accepted_status_codes: if global.default_http_status_codes.is_empty() {
                None
            } else {
                Some(global.default_http_status_codes.clone())
            },
            max_response_time_ms: global.default_response_time_max_ms,
            ..Default::default()
        };

        RunConfig {
            test_duration_ms: self.execution_settings.test_duration_ms,
            ramp_up_ms: self.execution_settings.ramp_up_time_ms,
            ramp_down_ms: self.execution_settings.ramp_down_time_ms,
            target_tps: self.performance_settings.target_transactions_per_second,
            max_vus: self.performance_settings.max_concurrent_users,
            request_timeout_ms: self.performance_settings.request_timeout_ms,
            steps,
            thresholds: Thresholds {
                max_response_time_ms: self.thresholds.max_response_time_ms,
                max_error_rate_percent: self.thresholds.max_error_rate_percent,
                min_tps: self.thresholds.min_transactions_per_second,
            },
            global_criteria,
        }
    }

    /// HTTP 客户端行为
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_millis(self.performance_settings.request_timeout_ms),
            ignore_ssl_errors: self.global_success_criteria.ignore_ssl_errors,
            follow_redirects: self.global_success_criteria.follow_redirects,
            max_redirects: self.global_success_criteria.max_redirects,
        }
    }
}
