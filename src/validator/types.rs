use serde::{Deserialize, Serialize};

/// Header 校验规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRule {
    /// 存在即可（任意值）
    Present,
    /// 值完全相等（大小写敏感）
    Equals,
    /// 包含子串（大小写不敏感）
    Contains,
    /// 正则匹配（大小写不敏感）
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderCheck {
    pub name: String,
    pub rule: HeaderRule,
    #[serde(default)]
    pub expected: Option<String>,
}

/// JSON 路径校验规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonPathRule {
    Present,
    IsNumber,
    IsString,
    /// 字符串化比较，大小写不敏感
    Equals,
    /// 仅对字符串值做正则匹配
    Regex,
}

/// 受限路径语法：以 $ 开头，点号分隔属性名，不支持数组下标和通配符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPathCheck {
    pub path: String,
    pub rule: JsonPathRule,
    #[serde(default)]
    pub expected: Option<String>,
}

/// 声明式成功判定条件
///
/// 缺省字段不参与评估；所有给出的字段都必须通过。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub accepted_status_codes: Option<Vec<u16>>,

    #[serde(default)]
    pub max_response_time_ms: Option<u64>,

    #[serde(default)]
    pub body_regex: Option<String>,

    #[serde(default)]
    pub body_must_contain: Option<Vec<String>>,

    #[serde(default)]
    pub header_checks: Option<Vec<HeaderCheck>>,

    #[serde(default)]
    pub json_path_checks: Option<Vec<JsonPathCheck>>,

    #[serde(default)]
    pub min_body_bytes: Option<usize>,

    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

impl SuccessCriteria {
    /// 仅检查状态码的快捷构造
    pub fn status_only(codes: Vec<u16>) -> Self {
        Self {
            accepted_status_codes: Some(codes),
            ..Default::default()
        }
    }

    /// 是否没有任何待评估字段
    pub fn is_vacuous(&self) -> bool {
        self.accepted_status_codes.is_none()
            && self.max_response_time_ms.is_none()
            && self.body_regex.is_none()
            && self.body_must_contain.is_none()
            && self.header_checks.is_none()
            && self.json_path_checks.is_none()
            && self.min_body_bytes.is_none()
            && self.max_body_bytes.is_none()
    }
}

/// 校验结论：ok 当且仅当所有已评估字段通过
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub ok: bool,
    pub reasons: Vec<String>,
}

impl ValidationVerdict {
    pub fn pass() -> Self {
        Self {
            ok: true,
            reasons: Vec::new(),
        }
    }

    pub fn fail(reasons: Vec<String>) -> Self {
        Self { ok: false, reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_vacuous() {
        assert!(SuccessCriteria::default().is_vacuous());
        assert!(!SuccessCriteria::status_only(vec![200]).is_vacuous());
    }

    #[test]
    fn test_criteria_toml_roundtrip() {
        let toml_str = r#"
accepted_status_codes = [200, 201]
max_response_time_ms = 2000

[[header_checks]]
name = "content-type"
rule = "contains"
expected = "json"

[[json_path_checks]]
path = "$.ok"
rule = "equals"
expected = "true"
"#;
        let criteria: SuccessCriteria = toml::from_str(toml_str).unwrap();
        assert_eq!(criteria.accepted_status_codes, Some(vec![200, 201]));
        assert_eq!(criteria.max_response_time_ms, Some(2000));
        assert_eq!(criteria.header_checks.as_ref().unwrap()[0].rule, HeaderRule::Contains);
        assert_eq!(
            criteria.json_path_checks.as_ref().unwrap()[0].rule,
            JsonPathRule::Equals
        );
    }
}
