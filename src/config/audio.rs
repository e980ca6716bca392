/// 音效与音乐配置

use serde::{Deserialize, Serialize};
use super::{ConfigError, ConfigResult};

/// 菜单音量的最大刻度（与 DOS 版一致）
pub const MAX_VOLUME: i32 = 15;

/// 弯音范围下限（百分比）
pub const MIN_PITCH_BEND_RANGE: i32 = 100;

/// 弯音范围上限（百分比）
pub const MAX_PITCH_BEND_RANGE: i32 = 300;

/// 音效配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundConfig {
    /// 启动时选用的音效模块在注册表中的索引
    pub sound_module: usize,

    /// 弯音范围（百分比），决定音高步进表的底数
    pub pitch_bend_range: i32,

    /// 音效音量 (0 - 15)
    pub sfx_volume: i32,

    /// 初始化时预缓存全部音效
    pub precache_sounds: bool,

    /// 禁用音效（-nosfx）
    pub no_sfx: bool,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            sound_module: 0,
            pitch_bend_range: 200,
            sfx_volume: 8,
            precache_sounds: true,
            no_sfx: false,
        }
    }
}

impl SoundConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0..=MAX_VOLUME).contains(&self.sfx_volume) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid sfx volume: {}",
                self.sfx_volume
            )));
        }
        if !(MIN_PITCH_BEND_RANGE..=MAX_PITCH_BEND_RANGE).contains(&self.pitch_bend_range) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid pitch bend range: {}",
                self.pitch_bend_range
            )));
        }
        Ok(())
    }
}

/// 音乐配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    /// 首选 MIDI 模块在音乐模块表中的索引
    pub midi_player: usize,

    /// 首选模块内的本地设备索引
    pub midi_device: usize,

    /// 音乐音量 (0 - 15)
    pub music_volume: i32,

    /// 禁用音乐（-nomusic）
    pub no_music: bool,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            midi_player: 0,
            midi_device: 0,
            music_volume: 8,
            no_music: false,
        }
    }
}

impl MusicConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0..=MAX_VOLUME).contains(&self.music_volume) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid music volume: {}",
                self.music_volume
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SoundConfig::default().validate().is_ok());
        assert!(MusicConfig::default().validate().is_ok());
    }

    #[test]
    fn test_volume_out_of_range() {
        let sound = SoundConfig {
            sfx_volume: 16,
            ..SoundConfig::default()
        };
        assert!(sound.validate().is_err());

        let music = MusicConfig {
            music_volume: -1,
            ..MusicConfig::default()
        };
        assert!(music.validate().is_err());
    }

    #[test]
    fn test_pitch_bend_range_bounds() {
        let mut sound = SoundConfig::default();
        sound.pitch_bend_range = MIN_PITCH_BEND_RANGE;
        assert!(sound.validate().is_ok());
        sound.pitch_bend_range = MAX_PITCH_BEND_RANGE + 1;
        assert!(sound.validate().is_err());
    }
}
