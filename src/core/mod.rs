//! 核心模块
//!
//! 包含跨子系统共享的基础设施：
//! - `error` - 错误类型定义
//! - `logging` - 日志初始化

pub mod error;
pub mod logging;

// 重新导出错误类型
pub use error::{
    BackendError, BackendResult, FormatError, FormatResult, MusicError, MusicResult, SoundError,
    SoundHalError, SoundHalResult, SoundResult,
};

pub use logging::initialize_logging;
