use std::collections::HashMap;
use std::sync::OnceLock;

use base64::{Engine as _, engine::general_purpose};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::variable::VariableContext;

/// 一次脚本执行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub applied: usize,
    pub skipped: usize,
}

struct Statements {
    parse_body_prop: Regex,
    parse_request_body: Regex,
    stringify: Regex,
    btoa: Regex,
    literal: Regex,
    set_collection_var: Regex,
}

fn statements() -> &'static Statements {
    static CELL: OnceLock<Statements> = OnceLock::new();
    CELL.get_or_init(|| Statements {
        parse_body_prop: Regex::new(
            r#"^var\s+(\w+)\s*=\s*JSON\.parse\(\s*responseBody\s*\)\.(\w+)\s*;?\s*$"#,
        )
        .unwrap(),
        parse_request_body: Regex::new(
            r#"^var\s+(\w+)\s*=\s*JSON\.parse\(\s*pm\.request\.body\.raw\s*\)\s*;?\s*$"#,
        )
        .unwrap(),
        stringify: Regex::new(r#"^var\s+(\w+)\s*=\s*JSON\.stringify\(\s*(\w+)\s*\)\s*;?\s*$"#)
            .unwrap(),
        btoa: Regex::new(r#"^var\s+(\w+)\s*=\s*btoa\(\s*(\w+)\s*\)\s*;?\s*$"#).unwrap(),
        literal: Regex::new(r#"^var\s+(\w+)\s*=\s*"([^"]*)"\s*;?\s*$"#).unwrap(),
        set_collection_var: Regex::new(
            r#"^pm\.collectionVariables\.set\(\s*"([^"]+)"\s*,\s*(\w+)\s*\)\s*;?\s*$"#,
        )
        .unwrap(),
    })
}

/// 执行一段请求前/后脚本
///
/// 逐行匹配固定的语句形式；空行与 // 注释忽略，无法解析或执行失败的
/// 语句告警后跳过，绝不中断迭代。
pub fn run_script(
    lines: &[String],
    vars: &mut VariableContext,
    response_body: Option<&str>,
    request_body: Option<&str>,
) -> ScriptOutcome {
    let mut temp: HashMap<String, String> = HashMap::new();
    let mut outcome = ScriptOutcome::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        match apply_statement(line, &mut temp, vars, response_body, request_body) {
            Ok(()) => outcome.applied += 1,
            Err(reason) => {
                warn!(statement = %line, "Script statement skipped: {}", reason);
                outcome.skipped += 1;
            }
        }
    }

    outcome
}

fn apply_statement(
    line: &str,
    temp: &mut HashMap<String, String>,
    vars: &mut VariableContext,
    response_body: Option<&str>,
    request_body: Option<&str>,
) -> Result<(), String> {
    let s = statements();

    if let Some(caps) = s.parse_body_prop.captures(line) {
        let body = response_body.ok_or("no response body available")?;
        let parsed: Value =
            serde_json::from_str(body).map_err(|e| format!("response body is not JSON: {}", e))?;
        let prop = &caps[2];
        let value = parsed
            .get(prop)
            .ok_or_else(|| format!("property \"{}\" not found in response", prop))?;
        // 字符串属性存原文，其余存 JSON 文本
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        temp.insert(caps[1].to_string(), text);
        return Ok(());
    }

    if let Some(caps) = s.parse_request_body.captures(line) {
        let body = request_body.ok_or("no request body available")?;
        temp.insert(caps[1].to_string(), body.to_string());
        return Ok(());
    }

    if let Some(caps) = s.stringify.captures(line) {
        let source = temp
            .get(&caps[2])
            .ok_or_else(|| format!("unknown variable \"{}\"", &caps[2]))?
            .clone();
        temp.insert(caps[1].to_string(), source);
        return Ok(());
    }

    if let Some(caps) = s.btoa.captures(line) {
        let source = temp
            .get(&caps[2])
            .ok_or_else(|| format!("unknown variable \"{}\"", &caps[2]))?;
        let encoded = general_purpose::STANDARD.encode(source.as_bytes());
        temp.insert(caps[1].to_string(), encoded);
        return Ok(());
    }

    if let Some(caps) = s.literal.captures(line) {
        temp.insert(caps[1].to_string(), caps[2].to_string());
        return Ok(());
    }

    if let Some(caps) = s.set_collection_var.captures(line) {
        let source = temp
            .get(&caps[2])
            .ok_or_else(|| format!("unknown variable \"{}\"", &caps[2]))?
            .clone();
        vars.promote(caps[1].to_string(), source);
        return Ok(());
    }

    Err("unrecognized statement form".to_string())
}
