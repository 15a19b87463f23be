use std::time::Duration;

use reqwest::header::HeaderMap as Headers;

/// 已完整读入内存的响应
pub struct ResponseData {
    pub status: u16,
    pub headers: Headers,
    /// 响应体字节长度（解压后）
    pub body_bytes: usize,
    body_text: String,
    pub duration: Duration,
}

impl ResponseData {
    pub fn new(status: u16, headers: Headers, body: Vec<u8>, duration: Duration) -> Self {
        let body_bytes = body.len();
        // 二进制内容尽力解码，长度以字节为准
        let body_text = String::from_utf8_lossy(&body).into_owned();
        Self {
            status,
            headers,
            body_bytes,
            body_text,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.body_text
    }
}
