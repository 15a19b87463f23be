use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::response::ResponseData;
use crate::validator::{SuccessCriteria, ValidationVerdict};

/// 单次请求的执行结果，记录后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_name: String,

    pub method: String,

    pub url: String,

    /// 传输失败时为 0，超时为合成的 408
    pub status_code: u16,

    pub response_time_ms: u64,

    pub response_bytes: usize,

    /// 2xx 且校验通过才算成功
    pub is_success: bool,

    pub verdict: ValidationVerdict,

    pub error_message: Option<String>,

    pub captured_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// 收到 HTTP 响应（无论状态码）时的结果
    pub fn completed(
        step_name: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        response: &ResponseData,
        verdict: ValidationVerdict,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            method: method.into(),
            url: url.into(),
            status_code: response.status,
            response_time_ms: response.duration.as_millis() as u64,
            response_bytes: response.body_bytes,
            is_success: response.is_success() && verdict.ok,
            verdict,
            error_message: None,
            captured_at: Utc::now(),
        }
    }

    /// 传输层失败（DNS/连接/重置/请求构建失败）
    pub fn transport_failure(
        step_name: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            method: method.into(),
            url: url.into(),
            status_code: 0,
            response_time_ms: elapsed.as_millis() as u64,
            response_bytes: 0,
            is_success: false,
            verdict: ValidationVerdict::default(),
            error_message: Some(error.into()),
            captured_at: Utc::now(),
        }
    }

    /// 截止时间内未完成，合成 408
    pub fn timed_out(
        step_name: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            method: method.into(),
            url: url.into(),
            status_code: 408,
            response_time_ms: elapsed.as_millis() as u64,
            response_bytes: 0,
            is_success: false,
            verdict: ValidationVerdict::default(),
            error_message: Some("request timed out".to_string()),
            captured_at: Utc::now(),
        }
    }

    /// 校验未通过但 HTTP 往返完成
    pub fn is_validation_failure(&self) -> bool {
        self.status_code != 0 && !self.verdict.ok
    }
}

/// 迭代中的一个步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlan {
    pub step_name: String,

    /// 步骤完成后的等待毫秒数
    #[serde(default)]
    pub inter_step_delay_ms: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 缺省时使用全局判定条件
    #[serde(default)]
    pub criteria: Option<SuccessCriteria>,
}

fn default_enabled() -> bool {
    true
}

/// 阈值：只用于计算最终的通过/失败结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_response_time_ms: u64,
    pub max_error_rate_percent: f64,
    pub min_tps: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_response_time_ms: 5000,
            max_error_rate_percent: 5.0,
            min_tps: 0.0,
        }
    }
}

/// 一次压测的有效配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub test_duration_ms: u64,
    pub ramp_up_ms: u64,
    pub ramp_down_ms: u64,

    pub target_tps: f64,
    pub max_vus: usize,
    pub request_timeout_ms: u64,

    pub steps: Vec<StepPlan>,

    pub thresholds: Thresholds,

    /// 步骤未指定判定条件时的全局缺省
    pub global_criteria: SuccessCriteria,
}

impl RunConfig {
    /// 压测总时长（不含排空宽限）
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.ramp_up_ms + self.test_duration_ms + self.ramp_down_ms)
    }

    /// 步骤生效的判定条件
    pub fn criteria_for<'a>(&'a self, step: &'a StepPlan) -> &'a SuccessCriteria {
        step.criteria.as_ref().unwrap_or(&self.global_criteria)
    }

    pub fn enabled_steps(&self) -> impl Iterator<Item = &StepPlan> {
        self.steps.iter().filter(|s| s.enabled)
    }
}

/// 调度器所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    RampUp,
    Steady,
    RampDown,
    Drain,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::RampUp => "ramp-up",
            RunPhase::Steady => "steady",
            RunPhase::RampDown => "ramp-down",
            RunPhase::Drain => "drain",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    #[test]
    fn test_completed_success_requires_2xx_and_verdict() {
        let response = ResponseData::new(
            200,
            HeaderMap::new(),
            b"{}".to_vec(),
            Duration::from_millis(12),
        );

        let ok = ExecutionResult::completed(
            "ping",
            "GET",
            "http://x/ping",
            &response,
            ValidationVerdict::pass(),
        );
        assert!(ok.is_success);
        assert_eq!(ok.status_code, 200);
        assert_eq!(ok.response_time_ms, 12);

        let failed_verdict = ExecutionResult::completed(
            "ping",
            "GET",
            "http://x/ping",
            &response,
            ValidationVerdict::fail(vec!["$.ok mismatch".to_string()]),
        );
        assert!(!failed_verdict.is_success);
        assert!(failed_verdict.is_validation_failure());
    }

    #[test]
    fn test_non_2xx_with_passing_verdict_is_not_success() {
        let response = ResponseData::new(
            503,
            HeaderMap::new(),
            Vec::new(),
            Duration::from_millis(8),
        );
        let result = ExecutionResult::completed(
            "ping",
            "GET",
            "http://x/ping",
            &response,
            ValidationVerdict::pass(),
        );
        assert!(!result.is_success);
    }

    #[test]
    fn test_transport_failure_has_status_zero() {
        let result = ExecutionResult::transport_failure(
            "ping",
            "GET",
            "http://x/ping",
            "connection refused",
            Duration::from_millis(3),
        );
        assert_eq!(result.status_code, 0);
        assert!(!result.is_success);
        assert!(!result.is_validation_failure());
        assert!(result.error_message.as_ref().unwrap().contains("refused"));
    }

    #[test]
    fn test_timed_out_synthesizes_408() {
        let result =
            ExecutionResult::timed_out("slow", "GET", "http://x/slow", Duration::from_millis(500));
        assert_eq!(result.status_code, 408);
        assert!(result.error_message.as_ref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_criteria_fallback_to_global() {
        let config = RunConfig {
            test_duration_ms: 1000,
            ramp_up_ms: 0,
            ramp_down_ms: 0,
            target_tps: 1.0,
            max_vus: 1,
            request_timeout_ms: 1000,
            steps: vec![
                StepPlan {
                    step_name: "with".to_string(),
                    inter_step_delay_ms: 0,
                    enabled: true,
                    criteria: Some(SuccessCriteria::status_only(vec![201])),
                },
                StepPlan {
                    step_name: "without".to_string(),
                    inter_step_delay_ms: 0,
                    enabled: true,
                    criteria: None,
                },
            ],
            thresholds: Thresholds::default(),
            global_criteria: SuccessCriteria::status_only(vec![200]),
        };

        let with = config.criteria_for(&config.steps[0]);
        assert_eq!(with.accepted_status_codes, Some(vec![201]));

        let without = config.criteria_for(&config.steps[1]);
        assert_eq!(without.accepted_status_codes, Some(vec![200]));
    }

    #[test]
    fn test_enabled_steps_filter() {
        let config = RunConfig {
            test_duration_ms: 1000,
            ramp_up_ms: 0,
            ramp_down_ms: 0,
            target_tps: 1.0,
            max_vus: 1,
            request_timeout_ms: 1000,
            steps: vec![
                StepPlan {
                    step_name: "on".to_string(),
                    inter_step_delay_ms: 0,
                    enabled: true,
                    criteria: None,
                },
                StepPlan {
                    step_name: "off".to_string(),
                    inter_step_delay_ms: 0,
                    enabled: false,
                    criteria: None,
                },
            ],
            thresholds: Thresholds::default(),
            global_criteria: SuccessCriteria::default(),
        };

        let names: Vec<_> = config
            .enabled_steps()
            .map(|s| s.step_name.as_str())
            .collect();
        assert_eq!(names, vec!["on"]);
    }
}
