//! 统一错误处理模块
//!
//! 提供声音子系统范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **后端错误** (`BackendError`): 单个声音/音乐后端的原生 API 失败，只记录日志，从不致命
//! - **子系统错误** (`SoundError` / `MusicError`): 通道池与音乐调度器对调用者暴露的错误
//! - **格式错误** (`FormatError`): MUS/DMX/WAD 等字节格式解析失败
//!
//! 唯一的致命错误是 `MusicError::NoBackendAvailable`：所有已注册的音乐后端都无法初始化。

use thiserror::Error;

/// 后端模块错误
///
/// 后端只通过它报告"这个后端不可用"，调用方负责记录并降级。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend not initialized")]
    NotInitialized,

    #[error("{step} failed: {reason}")]
    Native { step: &'static str, reason: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl BackendError {
    /// 原生调用失败的快捷构造
    pub fn native(step: &'static str, reason: impl Into<String>) -> Self {
        Self::Native {
            step,
            reason: reason.into(),
        }
    }
}

/// 音效通道池错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoundError {
    #[error("Sound system not initialized")]
    NotInitialized,

    #[error("No free channel available")]
    NoFreeChannel,

    #[error("Failed to cache sound effect: {0}")]
    CacheFailed(String),

    #[error("Failed to start sound effect: {0}")]
    StartFailed(String),

    #[error("Failed to initialize sound module: {0}")]
    InitFailed(#[from] BackendError),

    #[error("Invalid sound module index: {0}")]
    InvalidModule(usize),

    #[error("Channel {0} out of range")]
    ChannelOutOfRange(usize),
}

/// 音乐调度器错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MusicError {
    #[error("Music system not initialized")]
    NotInitialized,

    #[error("No music module could be initialized")]
    NoBackendAvailable,

    #[error("Failed to register song: {0}")]
    RegisterFailed(#[from] BackendError),
}

/// 字节格式解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Bad header: {0}")]
    BadHeader(String),

    #[error("Unexpected end of data at offset {0}")]
    Truncated(usize),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// 顶层错误，演示程序与集成代码使用
#[derive(Error, Debug)]
pub enum SoundHalError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Sound(#[from] SoundError),

    #[error(transparent)]
    Music(#[from] MusicError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 后端操作结果类型
pub type BackendResult<T> = Result<T, BackendError>;

/// 音效操作结果类型
pub type SoundResult<T> = Result<T, SoundError>;

/// 音乐操作结果类型
pub type MusicResult<T> = Result<T, MusicError>;

/// 格式解析结果类型
pub type FormatResult<T> = Result<T, FormatError>;

pub type SoundHalResult<T> = Result<T, SoundHalError>;
