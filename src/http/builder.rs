use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;
use url::Url;

use crate::collection::{BodySpec, RequestTemplate};
use crate::error::RuloadError;
use crate::http::types::Method;
use crate::variable::{VariableContext, VariableResolver};
use crate::Result;

/// 构建完成、可直接发送的请求体
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltBody {
    None,
    Raw { text: String, content_type: String },
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, String)>),
}

/// 模板替换变量后的具体请求
pub struct BuiltRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: BuiltBody,
    /// 替换后仍残留的占位符名称（调用方负责告警）
    pub unresolved: Vec<String>,
}

/// 请求构建器：RequestTemplate + VariableContext → BuiltRequest
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn build(template: &RequestTemplate, ctx: &VariableContext) -> Result<BuiltRequest> {
        let url = Self::build_url(template, ctx)?;
        let headers = Self::build_headers(template, ctx);
        let body = Self::build_body(template, ctx);

        Ok(BuiltRequest {
            method: template.method,
            url,
            headers,
            body,
            unresolved: Self::collect_unresolved(template, ctx),
        })
    }

    /// url_raw 可解析为绝对地址时优先使用，否则用分段合成
    fn build_url(template: &RequestTemplate, ctx: &VariableContext) -> Result<Url> {
        if !template.url_raw.is_empty() {
            let resolved = VariableResolver::substitute(&template.url_raw, ctx);
            if let Ok(url) = Url::parse(&resolved)
                && (url.scheme() == "http" || url.scheme() == "https")
                && url.host().is_some()
            {
                return Ok(url);
            }
        }
        Self::synthesize_url(template, ctx)
    }

    fn synthesize_url(template: &RequestTemplate, ctx: &VariableContext) -> Result<Url> {
        if template.host_parts.is_empty() {
            return Err(RuloadError::InvalidUrl(format!(
                "request '{}' has no parseable url and no host parts",
                template.name
            )));
        }

        let host = template
            .host_parts
            .iter()
            .map(|p| VariableResolver::substitute(p, ctx))
            .collect::<Vec<_>>()
            .join(".");

        let path = template
            .path_parts
            .iter()
            .map(|p| VariableResolver::substitute(p, ctx))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let mut url = Url::parse(&format!("https://{}/{}", host, path))
            .map_err(|e| RuloadError::InvalidUrl(format!("{}: {}", template.name, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            for param in template.query_params.iter().filter(|q| !q.disabled) {
                pairs.append_pair(
                    &VariableResolver::substitute(&param.key, ctx),
                    &VariableResolver::substitute(&param.value, ctx),
                );
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url)
    }

    /// 按集合顺序输出启用的 header；非法名称或值告警后跳过
    fn build_headers(template: &RequestTemplate, ctx: &VariableContext) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for h in template.headers.iter().filter(|h| !h.disabled) {
            let key = VariableResolver::substitute(&h.key, ctx);
            let value = VariableResolver::substitute(&h.value, ctx);

            let name = match HeaderName::from_bytes(key.as_bytes()) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %key, "Skipping invalid header name: {}", e);
                    continue;
                }
            };
            let value = match HeaderValue::from_str(&value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %key, "Skipping invalid header value: {}", e);
                    continue;
                }
            };

            headers.append(name, value);
        }

        headers
    }

    fn build_body(template: &RequestTemplate, ctx: &VariableContext) -> BuiltBody {
        if !template.method.allows_body() {
            return BuiltBody::None;
        }

        match &template.body {
            BodySpec::None => BuiltBody::None,
            BodySpec::Raw(text) => {
                let resolved = VariableResolver::substitute(text, ctx);
                let content_type = detect_content_type(&resolved);
                BuiltBody::Raw {
                    text: resolved,
                    content_type: content_type.to_string(),
                }
            }
            BodySpec::UrlEncoded(pairs) => BuiltBody::Form(resolve_pairs(pairs, ctx)),
            BodySpec::Multipart(pairs) => BuiltBody::Multipart(resolve_pairs(pairs, ctx)),
        }
    }

    fn collect_unresolved(template: &RequestTemplate, ctx: &VariableContext) -> Vec<String> {
        let mut names = Vec::new();
        let mut push_from = |text: &str| {
            for name in VariableResolver::unresolved_names(text, ctx) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        };

        push_from(&template.url_raw);
        for part in template.host_parts.iter().chain(&template.path_parts) {
            push_from(part);
        }
        for kv in template.query_params.iter().chain(&template.headers) {
            if !kv.disabled {
                push_from(&kv.value);
            }
        }
        match &template.body {
            BodySpec::Raw(text) => push_from(text),
            BodySpec::UrlEncoded(pairs) | BodySpec::Multipart(pairs) => {
                for kv in pairs {
                    push_from(&kv.value);
                }
            }
            BodySpec::None => {}
        }
        names
    }
}

fn resolve_pairs(
    pairs: &[crate::collection::KeyValue],
    ctx: &VariableContext,
) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter(|kv| !kv.disabled)
        .map(|kv| {
            (
                VariableResolver::substitute(&kv.key, ctx),
                VariableResolver::substitute(&kv.value, ctx),
            )
        })
        .collect()
}

/// 文本以 { 或 [ 开头且为合法 JSON 时判定为 application/json
fn detect_content_type(body: &str) -> &'static str {
    let trimmed = body.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(body).is_ok()
    {
        "application/json"
    } else {
        "text/plain"
    }
}
