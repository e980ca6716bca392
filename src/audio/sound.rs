//! 音效子系统
//!
//! `SoundSystem` 持有通道池、步进表和全部已注册的音效模块，同一时刻只有一个模块处于活动状态。
//! 所有接口都在游戏主循环线程上同步调用。
//!
//! # 示例
//!
//! ```ignore
//! let mut sound = SoundSystem::new(&config, modules, Box::new(wad));
//! sound.init_sound(&mut sfx_table)?;
//! let channel = sound.start_sound(sfx_table.get_mut(pistol).unwrap(), 127, NORM_SEP, NORM_PITCH)?;
//! ```

use super::channel::{ChannelId, ChannelPool, StepTable};
use super::module::{AdjustedParams, PitchStep, SoundModule, SoundOrigin};
use super::sfx::{SfxInfo, SfxTable};
use crate::config::{
    SoundHalConfig, SoundConfig, MAX_PITCH_BEND_RANGE, MAX_VOLUME, MIN_PITCH_BEND_RANGE,
};
use crate::core::error::{SoundError, SoundResult};
use crate::resources::LumpSource;

/// 音效子系统
pub struct SoundSystem {
    config: SoundConfig,
    no_music: bool,
    modules: Vec<Box<dyn SoundModule>>,
    active: usize,
    initialized: bool,
    pool: ChannelPool,
    steps: StepTable,
    lumps: Box<dyn LumpSource>,
}

impl SoundSystem {
    /// 创建未初始化的音效子系统
    pub fn new(
        config: &SoundHalConfig,
        modules: Vec<Box<dyn SoundModule>>,
        lumps: Box<dyn LumpSource>,
    ) -> Self {
        let mut system = Self {
            config: config.sound.clone(),
            no_music: config.music.no_music,
            modules,
            active: config.sound.sound_module,
            initialized: false,
            pool: ChannelPool::new(),
            steps: StepTable::new(config.sound.pitch_bend_range),
            lumps,
        };
        system.set_channels();
        system
    }

    /// 初始化配置选定的音效模块
    ///
    /// 同时禁用音效和音乐时直接跳过。模块初始化失败时子系统保持未初始化状态。
    pub fn init_sound(&mut self, sfx_table: &mut SfxTable) -> SoundResult<()> {
        if self.config.no_sfx && self.no_music {
            tracing::info!(target: "sound", "Sound and music disabled, skipping sound init");
            return Ok(());
        }

        let index = self.config.sound_module;
        if index >= self.modules.len() {
            tracing::error!(target: "sound", "Invalid sound module index {}", index);
            return Err(SoundError::InvalidModule(index));
        }
        self.active = index;

        let module = &mut self.modules[index];
        tracing::info!(target: "sound", "Initializing sound module {}", module.name());
        if let Err(e) = module.init_sound() {
            tracing::error!(target: "sound", "Failed to initialize sound: {}", e);
            return Err(SoundError::InitFailed(e));
        }
        self.initialized = true;

        if !self.config.no_sfx {
            if self.config.precache_sounds {
                self.precache_sounds(sfx_table);
            }
            let links = sfx_table.install_substitution_links(self.lumps.as_ref());
            tracing::debug!(target: "sound", "Installed {} substitution links", links);
        }

        Ok(())
    }

    fn precache_sounds(&mut self, sfx_table: &mut SfxTable) {
        tracing::info!(target: "sound", "Precaching all sound effects");
        let module = &mut self.modules[self.active];
        let mut cached = 0;
        for id in sfx_table.playable_ids() {
            if let Some(sfx) = sfx_table.get_mut(id) {
                if module.cache_sound(sfx, self.lumps.as_ref()) {
                    cached += 1;
                }
            }
        }
        tracing::info!(target: "sound", "Precached {} sound effects", cached);
    }

    /// 关闭当前模块，可重复调用
    pub fn shutdown_sound(&mut self) {
        if !self.initialized {
            return;
        }
        let module = &mut self.modules[self.active];
        tracing::info!(target: "sound", "Shutting down sound module {}", module.name());
        module.shutdown_sound();
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 当前活动模块下标
    pub fn active_module(&self) -> usize {
        self.active
    }

    /// 已注册模块名
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// 通道池（只读）
    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    /// 当前步进表
    pub fn step_table(&self) -> &StepTable {
        &self.steps
    }

    fn stop_channel(&mut self, channel: ChannelId) {
        if self.pool.is_enabled(channel) {
            self.modules[self.active].stop_sound(channel);
            self.pool.release(channel);
        }
    }

    /// 在第一个空闲通道上开始播放音效
    ///
    /// 通道全部占用时不抢占正在播放的声音，直接返回 `NoFreeChannel`。
    pub fn start_sound(
        &mut self,
        sfx: &mut SfxInfo,
        volume: i32,
        separation: i32,
        pitch: i32,
    ) -> SoundResult<ChannelId> {
        if !self.initialized {
            return Err(SoundError::NotInitialized);
        }

        let channel = self.pool.find_free().ok_or(SoundError::NoFreeChannel)?;

        self.stop_channel(channel);

        if !self.modules[self.active].cache_sound(sfx, self.lumps.as_ref()) {
            return Err(SoundError::CacheFailed(sfx.name.clone()));
        }

        let id = self.pool.occupy(channel, sfx.id);
        self.update_sound_params(channel, volume, separation);

        let step = PitchStep {
            pitch,
            step: self.steps.step(pitch),
        };
        if !self.modules[self.active].start_sound(channel, sfx, step) {
            tracing::warn!(target: "sound", "Error playing sfx {} on {}", sfx.name, channel);
            self.stop_channel(channel);
            return Err(SoundError::StartFailed(sfx.name.clone()));
        }

        tracing::trace!(target: "sound", "Started {} on {} with id {}", sfx.name, channel, id);
        Ok(channel)
    }

    /// 停止通道；空闲通道不会触发后端调用
    pub fn stop_sound(&mut self, channel: ChannelId) {
        if !self.initialized {
            return;
        }
        self.stop_channel(channel);
    }

    pub fn sound_is_playing(&self, channel: ChannelId) -> bool {
        self.initialized && self.modules[self.active].sound_is_playing(channel)
    }

    /// 通道当前的播放实例 ID，未初始化时为 0
    pub fn sound_id(&self, channel: ChannelId) -> u64 {
        if !self.initialized {
            return 0;
        }
        self.pool.slot(channel).id
    }

    pub fn channel_is_enabled(&self, channel: ChannelId) -> bool {
        self.pool.is_enabled(channel)
    }

    pub fn adjust_sound_params(
        &self,
        listener: &SoundOrigin,
        source: &SoundOrigin,
        chanvol: i32,
    ) -> Option<AdjustedParams> {
        if !self.initialized {
            return None;
        }
        self.modules[self.active].adjust_sound_params(listener, source, chanvol)
    }

    pub fn update_sound_params(&mut self, channel: ChannelId, volume: i32, separation: i32) {
        if !self.initialized {
            return;
        }
        self.modules[self.active].update_sound_params(channel, volume, separation);
    }

    pub fn update_listener_params(&mut self, listener: &SoundOrigin) {
        if !self.initialized {
            return;
        }
        self.modules[self.active].update_listener_params(listener);
    }

    pub fn defer_updates(&mut self) {
        if !self.initialized {
            return;
        }
        self.modules[self.active].defer_updates();
    }

    pub fn process_updates(&mut self) {
        if !self.initialized {
            return;
        }
        self.modules[self.active].process_updates();
    }

    /// 清空所有通道并按当前弯音范围重建步进表
    pub fn set_channels(&mut self) {
        self.pool.reset();
        self.steps = StepTable::new(self.config.pitch_bend_range);
    }

    /// 修改弯音范围（钳制到 100 - 300），下次 `set_channels` 时生效
    pub fn set_pitch_bend_range(&mut self, range: i32) {
        self.config.pitch_bend_range = range.clamp(MIN_PITCH_BEND_RANGE, MAX_PITCH_BEND_RANGE);
    }

    /// 音效音量 (0 - 15)
    pub fn set_sfx_volume(&mut self, volume: i32) {
        self.config.sfx_volume = volume.clamp(0, MAX_VOLUME);
    }

    pub fn sfx_volume(&self) -> i32 {
        self.config.sfx_volume
    }

    pub fn allow_reinit_sound(&self) -> bool {
        if !self.initialized {
            tracing::warn!(target: "sound", "Sound was never initialized");
            return false;
        }
        self.modules[self.active].allow_reinit_sound()
    }

    /// 运行时切换音效模块
    ///
    /// 新模块重新初始化失败时只记录警告，仍然保持为活动模块。
    pub fn set_sound_module(&mut self, index: usize) -> SoundResult<()> {
        if !self.initialized {
            tracing::warn!(target: "sound", "Sound was never initialized");
            return Err(SoundError::NotInitialized);
        }
        if index >= self.modules.len() {
            tracing::warn!(target: "sound", "Invalid sound module choice {}", index);
            return Err(SoundError::InvalidModule(index));
        }

        for channel in ChannelId::all() {
            self.stop_channel(channel);
        }

        self.modules[self.active].shutdown_module();
        self.active = index;
        self.config.sound_module = index;

        let module = &mut self.modules[index];
        match module.reinit_sound() {
            Ok(()) => tracing::info!(target: "sound", "Switched to sound module {}", module.name()),
            Err(e) => tracing::warn!(target: "sound", "Failed to reinitialize sound: {}", e),
        }
        Ok(())
    }
}

impl Drop for SoundSystem {
    fn drop(&mut self) {
        self.shutdown_sound();
    }
}
