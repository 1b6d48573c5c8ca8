pub mod api;
pub mod core;
pub mod models;

pub fn init_logging() {
    // 容器/终端环境用 env_logger，级别由 RUST_LOG 控制，默认 info
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();
}
