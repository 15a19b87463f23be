use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::collection::RequestTemplate;
use crate::http::builder::{BuiltBody, RequestBuilder};
use crate::runner::RunContext;
use crate::runner::types::ExecutionResult;
use crate::script::run_script;
use crate::validator::SuccessCriteria;
use crate::variable::VariableContext;

/// 执行单个步骤：前置脚本 → 构建 → 发送 → 后置脚本 → 记录指标
///
/// 构建失败按合成传输失败记录，任何环节都不会向上抛错。
pub(crate) async fn run_template_step(
    ctx: &RunContext,
    template: &RequestTemplate,
    criteria: &SuccessCriteria,
    vars: &mut VariableContext,
    warned: &mut HashSet<String>,
) -> ExecutionResult {
    run_script(&template.pre_script, vars, None, None);

    let built = match RequestBuilder::build(template, vars) {
        Ok(built) => built,
        Err(e) => {
            let result = ExecutionResult::transport_failure(
                &template.name,
                template.method.as_str(),
                &template.url_raw,
                format!("failed to build request: {}", e),
                Duration::ZERO,
            );
            ctx.metrics.record(&result);
            return result;
        }
    };

    // 同名占位符只告警一次
    for name in &built.unresolved {
        if warned.insert(name.clone()) {
            warn!(placeholder = %name, step = %template.name, "Placeholder left unresolved");
        }
    }

    let request_body_raw = match &built.body {
        BuiltBody::Raw { text, .. } => Some(text.clone()),
        _ => None,
    };

    let outcome = ctx.executor.execute(built, &template.name, criteria).await;

    run_script(
        &template.post_script,
        vars,
        outcome.response.as_ref().map(|r| r.text()),
        request_body_raw.as_deref(),
    );

    ctx.metrics.record(&outcome.result);
    outcome.result
}
