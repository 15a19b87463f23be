use crate::variable::types::VariableContext;
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static VAR_REGEX: OnceLock<Regex> = OnceLock::new();
    VAR_REGEX.get_or_init(|| Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").unwrap())
}

/// 变量替换器
pub struct VariableResolver;

impl VariableResolver {
    /// 替换文本中的所有 {{variable}} 占位符
    ///
    /// 未找到的变量保持原样，不做二次展开：值里带 {{x}} 时按字面插入。
    pub fn substitute(text: &str, context: &VariableContext) -> String {
        placeholder_regex()
            .replace_all(text, |caps: &Captures| {
                let var_name = &caps[1];
                context.get(var_name).unwrap_or(&caps[0]).to_string()
            })
            .to_string()
    }

    /// 列出文本中未能解析的占位符名称（按出现顺序去重）
    pub fn unresolved_names(text: &str, context: &VariableContext) -> Vec<String> {
        let mut names = Vec::new();
        for caps in placeholder_regex().captures_iter(text) {
            let name = &caps[1];
            if context.get(name).is_none() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}
