use std::collections::HashSet;

use tracing::{debug, warn};

use crate::collection::RequestTemplate;
use crate::runner::RunContext;
use crate::runner::step::run_template_step;
use crate::variable::VariableContext;

/// 认证前置序列
///
/// 惯例为两步：签发 JWT，再换取访问令牌。令牌通过后置脚本写入
/// 变量上下文，之后的迭代直接命中缓存，不再重复执行。
pub struct AuthSequence {
    step_names: Vec<String>,
}

impl AuthSequence {
    pub fn new(step_names: Vec<String>) -> Self {
        Self { step_names }
    }

    pub fn step_names(&self) -> &[String] {
        &self.step_names
    }

    /// 上下文中已有有效令牌
    pub fn is_satisfied(&self, vars: &VariableContext) -> bool {
        vars.get("access_token").is_some()
    }

    /// 在派发依赖步骤前确保令牌可用
    ///
    /// 序列失败不会中止虚拟用户：依赖步骤照常发出，由校验自然判负。
    pub async fn ensure(
        &self,
        ctx: &RunContext,
        template: &RequestTemplate,
        vars: &mut VariableContext,
        warned: &mut HashSet<String>,
    ) {
        if !template.requires_access_token() {
            return;
        }
        if self.is_satisfied(vars) {
            return;
        }

        debug!(step = %template.name, "Running auth prelude");
        for name in &self.step_names {
            let Some(prelude) = ctx.collection.get(name) else {
                warn!(step = %name, "Auth prelude step not found in collection");
                continue;
            };
            let criteria = ctx
                .config
                .steps
                .iter()
                .find(|s| &s.step_name == name)
                .and_then(|s| s.criteria.as_ref())
                .unwrap_or(&ctx.config.global_criteria)
                .clone();

            let result = run_template_step(ctx, prelude, &criteria, vars, warned).await;
            if !result.is_success {
                warn!(step = %name, status = result.status_code, "Auth prelude step failed");
            }
        }

        if !self.is_satisfied(vars) {
            warn!("Auth prelude finished without producing access_token");
        }
    }
}
