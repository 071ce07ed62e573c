pub mod api;
pub mod core;
pub mod segmenter;

/// 初始化日志，`RUST_LOG` 未设置时默认 info；重复调用无副作用
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
