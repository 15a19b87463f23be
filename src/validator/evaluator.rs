use std::time::Duration;

use regex::RegexBuilder;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::validator::types::{
    HeaderCheck, HeaderRule, JsonPathCheck, JsonPathRule, SuccessCriteria, ValidationVerdict,
};

/// 对响应执行声明式校验
///
/// 所有给出的规则按声明顺序全部评估（不短路），失败原因逐条累积。
pub fn validate_response(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    response_time: Duration,
    criteria: &SuccessCriteria,
) -> ValidationVerdict {
    let mut reasons = Vec::new();

    if let Some(codes) = &criteria.accepted_status_codes
        && !codes.contains(&status)
    {
        reasons.push(format!("status {} not in accepted set {:?}", status, codes));
    }

    if let Some(max_ms) = criteria.max_response_time_ms {
        let elapsed = response_time.as_millis() as u64;
        if elapsed > max_ms {
            reasons.push(format!("response time {}ms exceeds {}ms", elapsed, max_ms));
        }
    }

    if let Some(pattern) = &criteria.body_regex {
        check_body_regex(pattern, body, &mut reasons);
    }

    if let Some(required) = &criteria.body_must_contain {
        for needle in required {
            if !body.to_lowercase().contains(&needle.to_lowercase()) {
                reasons.push(format!("body does not contain \"{}\"", needle));
            }
        }
    }

    if let Some(checks) = &criteria.header_checks {
        for check in checks {
            check_header(check, headers, &mut reasons);
        }
    }

    if let Some(checks) = &criteria.json_path_checks {
        for check in checks {
            check_json_path(check, body, &mut reasons);
        }
    }

    if let Some(min) = criteria.min_body_bytes
        && body.len() < min
    {
        reasons.push(format!("body size {} below minimum {}", body.len(), min));
    }
    if let Some(max) = criteria.max_body_bytes
        && body.len() > max
    {
        reasons.push(format!("body size {} above maximum {}", body.len(), max));
    }

    if reasons.is_empty() {
        ValidationVerdict::pass()
    } else {
        ValidationVerdict::fail(reasons)
    }
}

fn check_body_regex(pattern: &str, body: &str, reasons: &mut Vec<String>) {
    match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
    {
        Ok(re) => {
            if !re.is_match(body) {
                reasons.push(format!("body does not match regex \"{}\"", pattern));
            }
        }
        // 非法正则本身算失败，异常文本作为原因
        Err(e) => reasons.push(format!("body regex invalid: {}", e)),
    }
}

fn check_header(check: &HeaderCheck, headers: &HeaderMap, reasons: &mut Vec<String>) {
    let value = headers
        .get(check.name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let Some(actual) = value else {
        reasons.push(format!("header \"{}\" not present", check.name));
        return;
    };

    let expected = check.expected.as_deref().unwrap_or("");
    match check.rule {
        HeaderRule::Present => {}
        HeaderRule::Equals => {
            if actual != expected {
                reasons.push(format!(
                    "header \"{}\" is \"{}\", expected \"{}\"",
                    check.name, actual, expected
                ));
            }
        }
        HeaderRule::Contains => {
            if !actual.to_lowercase().contains(&expected.to_lowercase()) {
                reasons.push(format!(
                    "header \"{}\" value \"{}\" does not contain \"{}\"",
                    check.name, actual, expected
                ));
            }
        }
        HeaderRule::Regex => match RegexBuilder::new(expected).case_insensitive(true).build() {
            Ok(re) => {
                if !re.is_match(&actual) {
                    reasons.push(format!(
                        "header \"{}\" value \"{}\" does not match \"{}\"",
                        check.name, actual, expected
                    ));
                }
            }
            Err(e) => reasons.push(format!("header \"{}\" regex invalid: {}", check.name, e)),
        },
    }
}

fn check_json_path(check: &JsonPathCheck, body: &str, reasons: &mut Vec<String>) {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            reasons.push(format!("{}: body is not valid JSON: {}", check.path, e));
            return;
        }
    };

    let Some(value) = walk_path(&parsed, &check.path) else {
        reasons.push(format!("{}: path not found", check.path));
        return;
    };

    let expected = check.expected.as_deref().unwrap_or("");
    match check.rule {
        JsonPathRule::Present => {}
        JsonPathRule::IsNumber => {
            if !value.is_number() {
                reasons.push(format!("{}: value is not a number", check.path));
            }
        }
        JsonPathRule::IsString => {
            if !value.is_string() {
                reasons.push(format!("{}: value is not a string", check.path));
            }
        }
        JsonPathRule::Equals => {
            let actual = stringify(value);
            if !actual.eq_ignore_ascii_case(expected) {
                reasons.push(format!(
                    "{}: value \"{}\" != expected \"{}\"",
                    check.path, actual, expected
                ));
            }
        }
        JsonPathRule::Regex => {
            let Some(text) = value.as_str() else {
                reasons.push(format!("{}: regex rule requires a string value", check.path));
                return;
            };
            match RegexBuilder::new(expected).case_insensitive(true).build() {
                Ok(re) => {
                    if !re.is_match(text) {
                        reasons.push(format!(
                            "{}: value \"{}\" does not match \"{}\"",
                            check.path, text, expected
                        ));
                    }
                }
                Err(e) => reasons.push(format!("{}: regex invalid: {}", check.path, e)),
            }
        }
    }
}

/// 受限路径遍历：`$.a.b.c`，只接受对象属性
fn walk_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let rest = path.strip_prefix('$')?;
    let mut current = root;
    for segment in rest.split('.').filter(|s| !s.is_empty()) {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// 字符串值取原文，其余取 JSON 文本
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
