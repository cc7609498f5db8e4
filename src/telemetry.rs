//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存的日志和链路追踪初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// 初始化 tracing
///
/// 组合环境变量过滤、控制台输出和 OpenTelemetry 层。
/// 已有全局 subscriber 时不覆盖。
///
/// # 参数
///
/// * `service_name` - 服务名称，用作 tracer 名称
/// * `filter` - `RUST_LOG` 未设置时使用的过滤指令，例如 `"oxnear=debug"`
///
/// # 返回值
///
/// 本次调用成功安装全局 subscriber 时返回 true
pub fn init_tracing(service_name: &str, filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // 未配置导出器时 provider 不导出任何 span
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(telemetry)
        .try_init()
        .is_ok()
}
