use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collection::DataRow;

/// 列值的目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Double,
    Boolean,
    Datetime,
}

/// 列值的输出编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    None,
    Base64,
    Url,
}

/// CSV 列 → 占位符的映射规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRule {
    pub csv_column: String,

    pub placeholder_name: String,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default)]
    pub encoding: Encoding,
}

/// 映射文件级全局变量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub value: String,
}

/// 列映射表：有序规则列表 + 全局变量
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub columns: Vec<ColumnRule>,

    #[serde(default)]
    pub globals: Vec<GlobalVariable>,
}

impl ColumnMapping {
    /// 映射文件全局变量层
    pub fn global_variables(&self) -> HashMap<String, String> {
        self.globals
            .iter()
            .map(|g| (g.name.clone(), g.value.clone()))
            .collect()
    }

    /// 将一行数据按规则映射为占位符 → 文本值
    ///
    /// 类型转换失败时保留原始单元格并告警，不中断。
    pub fn apply_row(&self, row: &DataRow) -> HashMap<String, String> {
        let mut mapped = HashMap::new();
        for rule in &self.columns {
            let Some(raw) = row.get(&rule.csv_column) else {
                continue;
            };
            let coerced = match coerce(raw, rule.data_type) {
                Some(v) => v,
                None => {
                    warn!(
                        column = %rule.csv_column,
                        value = %raw,
                        "Cell failed {:?} coercion, keeping raw text",
                        rule.data_type
                    );
                    raw.clone()
                }
            };
            mapped.insert(rule.placeholder_name.clone(), encode(coerced, rule.encoding));
        }
        mapped
    }
}

/// 单元格类型转换，失败返回 None
fn coerce(raw: &str, data_type: DataType) -> Option<String> {
    let trimmed = raw.trim();
    match data_type {
        DataType::String => Some(raw.to_string()),
        DataType::Integer => trimmed.parse::<i64>().ok().map(|n| n.to_string()),
        DataType::Double => trimmed.parse::<f64>().ok().map(|f| f.to_string()),
        DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some("true".to_string()),
            "false" | "0" => Some("false".to_string()),
            _ => None,
        },
        DataType::Datetime => parse_date(trimmed).map(|d| d.format("%Y-%m-%d").to_string()),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }
    None
}

fn encode(value: String, encoding: Encoding) -> String {
    match encoding {
        Encoding::None => value,
        Encoding::Base64 => general_purpose::STANDARD.encode(value.as_bytes()),
        Encoding::Url => url::form_urlencoded::byte_serialize(value.as_bytes()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(column: &str, data_type: DataType, encoding: Encoding) -> ColumnRule {
        ColumnRule {
            csv_column: column.to_string(),
            placeholder_name: column.to_lowercase(),
            data_type,
            encoding,
        }
    }

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_integer_coercion() {
        let mapping = ColumnMapping {
            columns: vec![rule("BankId", DataType::Integer, Encoding::None)],
            globals: Vec::new(),
        };

        let mapped = mapping.apply_row(&row(&[("BankId", " 0077 ")]));
        assert_eq!(mapped.get("bankid"), Some(&"77".to_string()));
    }

    #[test]
    fn test_boolean_coercion_lowercases() {
        let mapping = ColumnMapping {
            columns: vec![rule("Active", DataType::Boolean, Encoding::None)],
            globals: Vec::new(),
        };

        let mapped = mapping.apply_row(&row(&[("Active", "TRUE")]));
        assert_eq!(mapped.get("active"), Some(&"true".to_string()));
    }

    #[test]
    fn test_datetime_coercion_to_iso_date() {
        let mapping = ColumnMapping {
            columns: vec![rule("CreatedOn", DataType::Datetime, Encoding::None)],
            globals: Vec::new(),
        };

        let mapped = mapping.apply_row(&row(&[("CreatedOn", "03/15/2024")]));
        assert_eq!(mapped.get("createdon"), Some(&"2024-03-15".to_string()));
    }

    #[test]
    fn test_failed_coercion_keeps_raw_cell() {
        let mapping = ColumnMapping {
            columns: vec![rule("Amount", DataType::Integer, Encoding::None)],
            globals: Vec::new(),
        };

        // 无法转换时保留原文，不报错
        let mapped = mapping.apply_row(&row(&[("Amount", "not-a-number")]));
        assert_eq!(mapped.get("amount"), Some(&"not-a-number".to_string()));
    }

    #[test]
    fn test_base64_encoding() {
        let mapping = ColumnMapping {
            columns: vec![rule("Secret", DataType::String, Encoding::Base64)],
            globals: Vec::new(),
        };

        let mapped = mapping.apply_row(&row(&[("Secret", "hello")]));
        assert_eq!(mapped.get("secret"), Some(&"aGVsbG8=".to_string()));
    }

    #[test]
    fn test_url_encoding() {
        let mapping = ColumnMapping {
            columns: vec![rule("Query", DataType::String, Encoding::Url)],
            globals: Vec::new(),
        };

        let mapped = mapping.apply_row(&row(&[("Query", "a b&c")]));
        assert_eq!(mapped.get("query"), Some(&"a+b%26c".to_string()));
    }

    #[test]
    fn test_missing_column_skipped() {
        let mapping = ColumnMapping {
            columns: vec![rule("Absent", DataType::String, Encoding::None)],
            globals: Vec::new(),
        };

        let mapped = mapping.apply_row(&row(&[("Other", "x")]));
        assert!(mapped.is_empty());
    }

    #[test]
    fn test_global_variables() {
        let mapping = ColumnMapping {
            columns: Vec::new(),
            globals: vec![GlobalVariable {
                name: "env".to_string(),
                value: "staging".to_string(),
            }],
        };

        let globals = mapping.global_variables();
        assert_eq!(globals.get("env"), Some(&"staging".to_string()));
    }
}
