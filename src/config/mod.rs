//! 统一配置系统
//!
//! 提供TOML/JSON配置文件、环境变量和运行时动态调整
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod audio;

pub use audio::{
    MusicConfig, SoundConfig, MAX_PITCH_BEND_RANGE, MAX_VOLUME, MIN_PITCH_BEND_RANGE,
};

/// 配置文件基础名
const CONFIG_BASENAME: &str = "sound_hal";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 声音子系统主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundHalConfig {
    /// 音效配置
    #[serde(default)]
    pub sound: SoundConfig,

    /// 音乐配置
    #[serde(default)]
    pub music: MusicConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SoundHalConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        // 音效配置
        if let Ok(val) = env::var("SOUND_HAL_SOUND_MODULE") {
            if let Ok(module) = val.parse() {
                self.sound.sound_module = module;
            }
        }
        if let Ok(val) = env::var("SOUND_HAL_SFX_VOLUME") {
            if let Ok(volume) = val.parse() {
                self.sound.sfx_volume = volume;
            }
        }
        if let Ok(val) = env::var("SOUND_HAL_PITCH_BEND_RANGE") {
            if let Ok(range) = val.parse() {
                self.sound.pitch_bend_range = range;
            }
        }
        if let Ok(val) = env::var("SOUND_HAL_NO_SFX") {
            self.sound.no_sfx = val.parse().unwrap_or(self.sound.no_sfx);
        }

        // 音乐配置
        if let Ok(val) = env::var("SOUND_HAL_MIDI_PLAYER") {
            if let Ok(player) = val.parse() {
                self.music.midi_player = player;
            }
        }
        if let Ok(val) = env::var("SOUND_HAL_MUSIC_VOLUME") {
            if let Ok(volume) = val.parse() {
                self.music.music_volume = volume;
            }
        }
        if let Ok(val) = env::var("SOUND_HAL_NO_MUSIC") {
            self.music.no_music = val.parse().unwrap_or(self.music.no_music);
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.sound.validate()?;
        self.music.validate()?;
        Ok(())
    }

    /// 用户配置目录下的配置文件路径
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(CONFIG_BASENAME)
                .join(format!("{}.toml", CONFIG_BASENAME))
        })
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./sound_hal.toml
    /// 2. ./sound_hal.json
    /// 3. <用户配置目录>/sound_hal/sound_hal.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        let toml_path = format!("{}.toml", CONFIG_BASENAME);
        if let Ok(config) = Self::from_toml_file(&toml_path) {
            tracing::info!(target: "config", "Loaded config from {}", toml_path);
            return config;
        }

        let json_path = format!("{}.json", CONFIG_BASENAME);
        if let Ok(config) = Self::from_json_file(&json_path) {
            tracing::info!(target: "config", "Loaded config from {}", json_path);
            return config;
        }

        if let Some(config_path) = Self::user_config_path() {
            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "config", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::info!(target: "config", "Using default configuration");
        Self::default()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出到控制台
    pub log_to_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_to_console: true,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}
