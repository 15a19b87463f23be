use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::Result;
use crate::http::builder::{BuiltBody, BuiltRequest};
use crate::http::response::ResponseData;
use crate::report::FailureLogger;
use crate::runner::types::ExecutionResult;
use crate::validator::{SuccessCriteria, validate_response};

/// 共享客户端的连接行为
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub request_timeout: Duration,
    pub ignore_ssl_errors: bool,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            ignore_ssl_errors: false,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

/// 一步执行的产出：结果记录 + 可供脚本读取的响应
pub struct StepOutcome {
    pub result: ExecutionResult,
    pub response: Option<ResponseData>,
}

/// HTTP 执行器，进程内共享一个带连接池的客户端
pub struct HttpExecutor {
    inner: reqwest::Client,
    timeout: Duration,
    failure_log: Option<Arc<FailureLogger>>,
}

impl HttpExecutor {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let redirect = if settings.follow_redirects {
            reqwest::redirect::Policy::limited(settings.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let inner = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .tcp_keepalive(Duration::from_secs(60))
            .danger_accept_invalid_certs(settings.ignore_ssl_errors)
            .redirect(redirect)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            inner,
            timeout: settings.request_timeout,
            failure_log: None,
        })
    }

    /// 附加失败日志记录器，非成功结果自动落盘
    pub fn with_failure_log(mut self, logger: Arc<FailureLogger>) -> Self {
        self.failure_log = Some(logger);
        self
    }

    /// 发送请求并分类结果
    ///
    /// 计时从发送前开始，到响应体完整读入内存为止。
    pub async fn execute(
        &self,
        request: BuiltRequest,
        step_name: &str,
        criteria: &SuccessCriteria,
    ) -> StepOutcome {
        let method = request.method.as_str().to_string();
        let url = request.url.to_string();
        let has_explicit_content_type = request.headers.contains_key(CONTENT_TYPE);

        let mut req = self
            .inner
            .request(request.method.into(), request.url)
            .headers(request.headers)
            .timeout(self.timeout);

        match request.body {
            BuiltBody::None => {}
            BuiltBody::Raw { text, content_type } => {
                if !has_explicit_content_type {
                    req = req.header(CONTENT_TYPE, content_type);
                }
                req = req.body(text);
            }
            BuiltBody::Form(pairs) => {
                req = req.form(&pairs);
            }
            BuiltBody::Multipart(pairs) => {
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in pairs {
                    form = form.text(key, value);
                }
                req = req.multipart(form);
            }
        }

        let start = Instant::now();
        let outcome = match req.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = response.headers().clone();
                match response.bytes().await {
                    Ok(bytes) => {
                        let duration = start.elapsed();
                        let data = ResponseData::new(status, headers, bytes.to_vec(), duration);
                        let verdict = validate_response(
                            data.status,
                            &data.headers,
                            data.text(),
                            data.duration,
                            criteria,
                        );
                        let result =
                            ExecutionResult::completed(step_name, &method, &url, &data, verdict);
                        StepOutcome {
                            result,
                            response: Some(data),
                        }
                    }
                    Err(e) => self.classify_error(step_name, &method, &url, e, start.elapsed()),
                }
            }
            Err(e) => self.classify_error(step_name, &method, &url, e, start.elapsed()),
        };

        if !outcome.result.is_success {
            debug!(
                step = %step_name,
                status = outcome.result.status_code,
                "Request not successful"
            );
            if let Some(logger) = &self.failure_log {
                logger.log_failure(&outcome.result);
            }
        }

        outcome
    }

    fn classify_error(
        &self,
        step_name: &str,
        method: &str,
        url: &str,
        error: reqwest::Error,
        elapsed: Duration,
    ) -> StepOutcome {
        let result = if error.is_timeout() {
            ExecutionResult::timed_out(step_name, method, url, elapsed)
        } else {
            ExecutionResult::transport_failure(step_name, method, url, error.to_string(), elapsed)
        };
        StepOutcome {
            result,
            response: None,
        }
    }
}
