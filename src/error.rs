use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuloadError {
    #[error("配置无效: {0}")]
    ConfigError(String),

    #[error("集合中不存在请求: {0}")]
    UnknownRequest(String),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("报告写入失败: {0}")]
    ReportError(String),

    #[error("{0}")]
    Other(String),
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for RuloadError {
    fn from(err: anyhow::Error) -> Self {
        RuloadError::Other(err.to_string())
    }
}

/// Result type for ruload crate
pub type Result<T> = std::result::Result<T, RuloadError>;
