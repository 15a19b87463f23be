use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ruload::collection::{DataRow, KeyValue, RequestCollection, RequestTemplate};
use ruload::http::{ClientSettings, HttpExecutor, Method};
use ruload::metrics::MetricsAggregator;
use ruload::runner::{AuthSequence, RunConfig, RunContext, Scheduler, StepPlan, Thresholds};
use ruload::validator::SuccessCriteria;
use ruload::variable::ColumnMapping;

const MAX_VUS: usize = 2;

fn auth_collection(base: &str) -> RequestCollection {
    let mut issue_jwt = RequestTemplate::new(
        "issue_jwt",
        Method::Post,
        format!("{}/auth/jwt", base),
    );
    issue_jwt.post_script = vec![
        "var j = JSON.parse(responseBody).jwt".to_string(),
        "pm.collectionVariables.set(\"jwt\", j)".to_string(),
    ];

    let mut exchange = RequestTemplate::new(
        "exchange_token",
        Method::Post,
        format!("{}/auth/token", base),
    );
    exchange.headers = vec![KeyValue::new("X-Jwt", "{{jwt}}")];
    exchange.post_script = vec![
        "var t = JSON.parse(responseBody).token".to_string(),
        "pm.collectionVariables.set(\"access_token\", t)".to_string(),
    ];

    let mut profile =
        RequestTemplate::new("profile", Method::Get, format!("{}/profile", base));
    profile.headers = vec![KeyValue::new("Authorization", "Bearer {{access_token}}")];

    RequestCollection::new(vec![issue_jwt, exchange, profile])
}

/// 认证序列缓存：令牌只换一次，后续迭代直接命中
#[tokio::test]
async fn test_auth_prelude_runs_once_per_vu() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/jwt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"jwt": "jwt-abc"})),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(header("X-Jwt", "jwt-abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "tok-123"})),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("Authorization", "Bearer tok-123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "tester"})),
        )
        .mount(&mock_server)
        .await;

    let config = RunConfig {
        test_duration_ms: 2500,
        ramp_up_ms: 0,
        ramp_down_ms: 0,
        target_tps: 50.0,
        max_vus: MAX_VUS,
        request_timeout_ms: 1000,
        steps: vec![StepPlan {
            step_name: "profile".to_string(),
            inter_step_delay_ms: 20,
            enabled: true,
            criteria: None,
        }],
        thresholds: Thresholds::default(),
        global_criteria: SuccessCriteria::status_only(vec![200]),
    };

    let ctx = RunContext {
        collection: Arc::new(auth_collection(&mock_server.uri())),
        rows: Arc::new(Vec::<DataRow>::new()),
        mapping: Arc::new(ColumnMapping::default()),
        config: Arc::new(config),
        executor: Arc::new(
            HttpExecutor::new(&ClientSettings {
                request_timeout: Duration::from_millis(1000),
                ..Default::default()
            })
            .unwrap(),
        ),
        metrics: Arc::new(MetricsAggregator::new()),
        auth: Some(Arc::new(AuthSequence::new(vec![
            "issue_jwt".to_string(),
            "exchange_token".to_string(),
        ]))),
    };
    let metrics = ctx.metrics.clone();

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    Scheduler::new(ctx).run(cancel_rx).await;

    let snapshot = metrics.snapshot();
    let jwt_count = snapshot
        .per_step_samples
        .get("issue_jwt")
        .map(|s| s.len())
        .unwrap_or(0);
    let exchange_count = snapshot
        .per_step_samples
        .get("exchange_token")
        .map(|s| s.len())
        .unwrap_or(0);
    let profile_count = snapshot
        .per_step_samples
        .get("profile")
        .map(|s| s.len())
        .unwrap_or(0);

    // 每个 VU 恰好执行一次认证序列
    assert_eq!(jwt_count, MAX_VUS);
    assert_eq!(exchange_count, MAX_VUS);
    // 依赖步骤执行次数远多于前置
    assert!(
        profile_count > jwt_count,
        "profile={} jwt={}",
        profile_count,
        jwt_count
    );
    // 全部成功说明令牌真的被带上了
    assert_eq!(snapshot.failed, 0);
}

/// 认证序列失败不拖垮 VU：依赖步骤照发并被校验判负
#[tokio::test]
async fn test_auth_prelude_failure_does_not_abort_vu() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/jwt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    // 没有合法令牌 → 401
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let config = RunConfig {
        test_duration_ms: 2000,
        ramp_up_ms: 0,
        ramp_down_ms: 0,
        target_tps: 50.0,
        max_vus: 1,
        request_timeout_ms: 1000,
        steps: vec![StepPlan {
            step_name: "profile".to_string(),
            inter_step_delay_ms: 20,
            enabled: true,
            criteria: None,
        }],
        thresholds: Thresholds::default(),
        global_criteria: SuccessCriteria::status_only(vec![200]),
    };

    let ctx = RunContext {
        collection: Arc::new(auth_collection(&mock_server.uri())),
        rows: Arc::new(Vec::<DataRow>::new()),
        mapping: Arc::new(ColumnMapping::default()),
        config: Arc::new(config),
        executor: Arc::new(
            HttpExecutor::new(&ClientSettings {
                request_timeout: Duration::from_millis(1000),
                ..Default::default()
            })
            .unwrap(),
        ),
        metrics: Arc::new(MetricsAggregator::new()),
        auth: Some(Arc::new(AuthSequence::new(vec![
            "issue_jwt".to_string(),
            "exchange_token".to_string(),
        ]))),
    };
    let metrics = ctx.metrics.clone();

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    Scheduler::new(ctx).run(cancel_rx).await;

    let snapshot = metrics.snapshot();
    let profile_count = snapshot
        .per_step_samples
        .get("profile")
        .map(|s| s.len())
        .unwrap_or(0);

    // 依赖步骤仍然被派发并记录为失败
    assert!(profile_count >= 1);
    assert_eq!(snapshot.succeeded, 0);
    assert!(snapshot.failed > 0);
}
