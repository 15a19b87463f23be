use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::http::Method;

/// 一行表格数据：CSV 列名 → 原始单元格文本
pub type DataRow = HashMap<String, String>;

/// 带启用开关的键值对（header / query / 表单项）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,

    pub value: String,

    /// 被禁用的条目在构建请求时跳过
    #[serde(default)]
    pub disabled: bool,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            disabled: false,
        }
    }
}

/// 请求体描述
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySpec {
    /// 无请求体
    #[default]
    None,

    /// 原始文本（Content-Type 根据内容自动识别）
    Raw(String),

    /// application/x-www-form-urlencoded 键值对
    UrlEncoded(Vec<KeyValue>),

    /// multipart/form-data 文本字段
    Multipart(Vec<KeyValue>),
}

/// 集合中的一个命名请求模板
///
/// URL 有两种表示：`url_raw` 为完整模板字符串（可能自带 query），
/// `host_parts`/`path_parts`/`query_params` 为分段表示。
/// 两者替换后必须指向同一地址；`url_raw` 可解析时优先使用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// 集合内唯一的名称
    pub name: String,

    pub method: Method,

    /// 带 {{placeholder}} 的完整 URL 模板
    #[serde(default)]
    pub url_raw: String,

    #[serde(default)]
    pub host_parts: Vec<String>,

    #[serde(default)]
    pub path_parts: Vec<String>,

    /// 保持集合中的原始顺序
    #[serde(default)]
    pub query_params: Vec<KeyValue>,

    #[serde(default)]
    pub headers: Vec<KeyValue>,

    #[serde(default)]
    pub body: BodySpec,

    /// 请求前脚本（逐行语句）
    #[serde(default)]
    pub pre_script: Vec<String>,

    /// 请求后脚本（逐行语句）
    #[serde(default)]
    pub post_script: Vec<String>,
}

impl RequestTemplate {
    pub fn new(name: impl Into<String>, method: Method, url_raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url_raw: url_raw.into(),
            host_parts: Vec::new(),
            path_parts: Vec::new(),
            query_params: Vec::new(),
            headers: Vec::new(),
            body: BodySpec::None,
            pre_script: Vec::new(),
            post_script: Vec::new(),
        }
    }

    /// 判断模板是否引用了认证令牌（需要先跑认证序列）
    ///
    /// 扫描整个模板：url_raw、分段 URL（host/path/query）、header 和请求体。
    pub fn requires_access_token(&self) -> bool {
        const TOKEN: &str = "{{access_token}}";

        if self.url_raw.contains(TOKEN) {
            return true;
        }
        if self
            .host_parts
            .iter()
            .chain(&self.path_parts)
            .any(|p| p.contains(TOKEN))
        {
            return true;
        }
        if self
            .query_params
            .iter()
            .any(|q| q.key.contains(TOKEN) || q.value.contains(TOKEN))
        {
            return true;
        }
        if let BodySpec::Raw(text) = &self.body
            && text.contains(TOKEN)
        {
            return true;
        }
        self.headers
            .iter()
            .any(|h| h.key.eq_ignore_ascii_case("authorization") || h.value.contains(TOKEN))
    }
}

/// 整个请求集合，按名称索引
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCollection {
    pub templates: Vec<RequestTemplate>,

    /// 集合级全局变量（优先级最低）
    #[serde(default)]
    pub globals: HashMap<String, String>,
}

impl RequestCollection {
    pub fn new(templates: Vec<RequestTemplate>) -> Self {
        Self {
            templates,
            globals: HashMap::new(),
        }
    }

    /// 按名称查找模板
    pub fn get(&self, name: &str) -> Option<&RequestTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
