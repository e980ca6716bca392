//! 日志初始化
//!
//! 基于 tracing-subscriber 的 fmt 输出。`RUST_LOG` 存在时优先于配置文件中的级别。

use crate::config::{LogLevel, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// 将配置中的日志级别转换为 EnvFilter 指令
pub fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// 初始化日志系统
///
/// 重复调用是安全的：已安装全局 subscriber 时直接忽略。
pub fn initialize_logging(config: &LoggingConfig) {
    if !config.log_to_console {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    tracing::debug!(target: "sound_hal", "Logging initialized at {:?}", config.level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(LogLevel::Warn), "warn");
        assert_eq!(filter_directive(LogLevel::Trace), "trace");
    }

    #[test]
    fn test_initialize_twice_is_harmless() {
        let config = LoggingConfig::default();
        initialize_logging(&config);
        initialize_logging(&config);
    }
}
