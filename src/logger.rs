use tracing_subscriber::{EnvFilter, fmt};

/// 初始化日志系统
///
/// 压测输出量大，默认用紧凑格式，级别通过 RUST_LOG 控制。
/// 未设置时只放行本 crate 的 info 及以上。
///
/// 示例:
/// - RUST_LOG=ruload=debug cargo run
/// - RUST_LOG=ruload::runner=trace cargo run
pub fn init_logger() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ruload=info"));

    fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
