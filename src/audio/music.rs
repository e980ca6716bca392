//! 音乐调度
//!
//! `MusicSystem` 在一张有序的 MIDI 模块表与一个常驻的流式模块之间分派歌曲：
//! MUS/MIDI 数据交给当前选中的 MIDI 模块，其余格式交给流式模块。
//! 首选模块初始化失败时按表顺序在设备 0 上逐个尝试，全部失败才是致命错误。
//!
//! 设备用跨模块的全局下标表示：每个模块占用 `num_devices` 个连续下标。

use super::module::{MusicModule, SongHandle};
use crate::config::{MusicConfig, SoundHalConfig, MAX_VOLUME};
use crate::core::error::{MusicError, MusicResult};
use crate::formats::{looks_like_midi, looks_like_mus};

/// 音乐模块表项
pub struct MusicModuleEntry {
    pub module: Box<dyn MusicModule>,
    /// 模块设备数，由 `device_list` 刷新
    pub num_devices: usize,
}

impl MusicModuleEntry {
    pub fn new(module: Box<dyn MusicModule>) -> Self {
        Self {
            module,
            num_devices: 1,
        }
    }
}

/// 把全局设备下标映射为 (模块下标, 模块内设备下标)
pub fn resolve_device(counts: &[usize], global: usize) -> Option<(usize, usize)> {
    let mut accum = 0;
    for (module, &count) in counts.iter().enumerate() {
        if global >= accum && global < accum + count {
            return Some((module, global - accum));
        }
        accum += count;
    }
    None
}

/// 在设备 0 上按表顺序找到第一个能初始化的模块
pub fn fallback_backend(modules: &mut [MusicModuleEntry]) -> MusicResult<usize> {
    for (index, entry) in modules.iter_mut().enumerate() {
        match entry.module.init_music(0) {
            Ok(()) => {
                tracing::info!(target: "music", "Falling back to music module {}", entry.module.name());
                return Ok(index);
            }
            Err(e) => {
                tracing::warn!(target: "music", "Music module {} unavailable: {}", entry.module.name(), e)
            }
        }
    }
    tracing::error!(target: "music", "No music module could be initialized");
    Err(MusicError::NoBackendAvailable)
}

/// 先尝试首选模块的指定设备，失败后走降级搜索
pub fn select_backend(
    modules: &mut [MusicModuleEntry],
    preferred: usize,
    device: usize,
) -> MusicResult<usize> {
    select_backend_device(modules, preferred, device).map(|(index, _)| index)
}

/// 同 [`select_backend`]，额外返回实际初始化的本地设备
fn select_backend_device(
    modules: &mut [MusicModuleEntry],
    preferred: usize,
    device: usize,
) -> MusicResult<(usize, usize)> {
    if let Some(entry) = modules.get_mut(preferred) {
        match entry.module.init_music(device) {
            Ok(()) => {
                tracing::info!(
                    target: "music",
                    "Using music module {} device {}",
                    entry.module.name(),
                    device
                );
                return Ok((preferred, device));
            }
            Err(e) => tracing::warn!(
                target: "music",
                "Music module {} failed on device {}: {}",
                entry.module.name(),
                device,
                e
            ),
        }
    } else {
        tracing::warn!(target: "music", "Invalid music module index {}", preferred);
    }
    fallback_backend(modules).map(|index| (index, 0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveMusic {
    Stream,
    Midi,
}

/// 音乐调度器
pub struct MusicSystem {
    config: MusicConfig,
    stream: Box<dyn MusicModule>,
    modules: Vec<MusicModuleEntry>,
    midi_player: usize,
    midi_device: usize,
    midi_suspended: bool,
    active: Option<ActiveMusic>,
}

impl MusicSystem {
    /// 创建未初始化的调度器
    pub fn new(
        config: &SoundHalConfig,
        stream: Box<dyn MusicModule>,
        modules: Vec<Box<dyn MusicModule>>,
    ) -> Self {
        Self {
            config: config.music.clone(),
            stream,
            modules: modules.into_iter().map(MusicModuleEntry::new).collect(),
            midi_player: config.music.midi_player,
            midi_device: config.music.midi_device,
            midi_suspended: false,
            active: None,
        }
    }

    /// 初始化音乐输出
    ///
    /// 禁用音乐时直接返回。所有模块都无法初始化时返回 `NoBackendAvailable`，调用方应当退出。
    pub fn init_music(&mut self) -> MusicResult<()> {
        if self.config.no_music {
            tracing::info!(target: "music", "Music disabled");
            return Ok(());
        }

        if let Err(e) = self.stream.init_music(0) {
            tracing::warn!(target: "music", "Streaming module {} unavailable: {}", self.stream.name(), e);
        }

        let (index, device) = match select_backend_device(
            &mut self.modules,
            self.config.midi_player,
            self.config.midi_device,
        ) {
            Ok(selection) => selection,
            Err(e) => {
                self.stream.shutdown_music();
                return Err(e);
            }
        };

        self.set_midi_selection(index, device);
        Ok(())
    }

    fn set_midi_selection(&mut self, index: usize, device: usize) {
        self.midi_player = index;
        self.midi_device = device;
        self.midi_suspended = false;
        self.active = Some(ActiveMusic::Midi);
    }

    /// 关闭流式模块与 MIDI 模块
    pub fn shutdown_music(&mut self) {
        if self.active.is_none() {
            return;
        }
        tracing::info!(target: "music", "Shutting down music");
        self.stream.shutdown_music();
        if let Some(entry) = self.modules.get_mut(self.midi_player) {
            entry.module.shutdown_music();
        }
        self.active = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// 当前 MIDI 模块下标
    pub fn midi_player(&self) -> usize {
        self.midi_player
    }

    /// 当前活动模块是否为流式模块
    pub fn streaming_active(&self) -> bool {
        self.active == Some(ActiveMusic::Stream)
    }

    /// 按全局设备下标切换 MIDI 模块
    pub fn set_midi_player(&mut self, global_device: usize) -> MusicResult<()> {
        if self.config.no_music {
            return Ok(());
        }
        if self.active.is_none() {
            return Err(MusicError::NotInitialized);
        }

        if let Some(entry) = self.modules.get_mut(self.midi_player) {
            entry.module.shutdown_music();
        }

        let counts: Vec<usize> = self.modules.iter().map(|entry| entry.num_devices).collect();
        let result = match resolve_device(&counts, global_device) {
            Some((index, local)) => select_backend_device(&mut self.modules, index, local),
            None => {
                tracing::warn!(target: "music", "Device {} does not exist", global_device);
                fallback_backend(&mut self.modules).map(|chosen| (chosen, 0))
            }
        };

        match result {
            Ok((index, device)) => {
                self.set_midi_selection(index, device);
                self.config.midi_player = index;
                self.config.midi_device = device;
                Ok(())
            }
            Err(e) => {
                self.stream.shutdown_music();
                self.active = None;
                Err(e)
            }
        }
    }

    fn active_module(&mut self) -> Option<&mut Box<dyn MusicModule>> {
        match self.active? {
            ActiveMusic::Stream => Some(&mut self.stream),
            ActiveMusic::Midi => self
                .modules
                .get_mut(self.midi_player)
                .map(|entry| &mut entry.module),
        }
    }

    /// 注册歌曲，并按数据签名选择处理它的模块
    pub fn register_song(&mut self, data: &[u8]) -> MusicResult<SongHandle> {
        if self.active.is_none() {
            return Err(MusicError::NotInitialized);
        }

        if looks_like_mus(data) || looks_like_midi(data) {
            if self.midi_suspended {
                self.resume_midi_module();
            }
            self.active = Some(ActiveMusic::Midi);
        } else {
            if let Some(entry) = self.modules.get_mut(self.midi_player) {
                if entry.module.conflicts_with_streaming() && !self.midi_suspended {
                    tracing::debug!(
                        target: "music",
                        "Shutting down {} before streaming",
                        entry.module.name()
                    );
                    entry.module.shutdown_music();
                    self.midi_suspended = true;
                }
            }
            self.active = Some(ActiveMusic::Stream);
        }

        let volume = self.config.music_volume;
        let module = self.active_module().ok_or(MusicError::NotInitialized)?;
        module.set_music_volume(volume);
        module.register_song(data).map_err(|e| {
            tracing::warn!(target: "music", "Failed to register song: {}", e);
            MusicError::RegisterFailed(e)
        })
    }

    fn resume_midi_module(&mut self) {
        let device = self.midi_device;
        if let Some(entry) = self.modules.get_mut(self.midi_player) {
            if let Err(e) = entry.module.init_music(device) {
                tracing::warn!(
                    target: "music",
                    "Failed to restart music module {}: {}",
                    entry.module.name(),
                    e
                );
            }
        }
        self.midi_suspended = false;
    }

    pub fn play_song(&mut self, handle: SongHandle, looping: bool) {
        if let Some(module) = self.active_module() {
            module.play_song(handle, looping);
        }
    }

    pub fn pause_song(&mut self, handle: SongHandle) {
        if let Some(module) = self.active_module() {
            module.pause_song(handle);
        }
    }

    pub fn resume_song(&mut self, handle: SongHandle) {
        if let Some(module) = self.active_module() {
            module.resume_song(handle);
        }
    }

    pub fn stop_song(&mut self, handle: SongHandle) {
        if let Some(module) = self.active_module() {
            module.stop_song(handle);
        }
    }

    pub fn unregister_song(&mut self, handle: SongHandle) {
        if let Some(module) = self.active_module() {
            module.unregister_song(handle);
        }
    }

    /// 每个游戏 tick 调用一次
    pub fn update_music(&mut self) {
        if let Some(module) = self.active_module() {
            module.update_music();
        }
    }

    /// 设置音乐音量 (0 - 15)
    pub fn set_music_volume(&mut self, volume: i32) {
        let volume = volume.clamp(0, MAX_VOLUME);
        self.config.music_volume = volume;
        if let Some(module) = self.active_module() {
            module.set_music_volume(volume);
        }
    }

    pub fn music_volume(&self) -> i32 {
        self.config.music_volume
    }

    /// 汇总所有 MIDI 模块的设备名，返回 (设备列表, 当前全局下标)
    ///
    /// 同时刷新各模块的设备数，供 `set_midi_player` 做下标映射。
    pub fn device_list(&mut self) -> (Vec<String>, usize) {
        let mut devices = Vec::new();
        let mut current = 0;

        for (index, entry) in self.modules.iter_mut().enumerate() {
            let (names, selected) = entry.module.device_list();
            if index == self.midi_player {
                current = devices.len() + selected;
            }
            entry.num_devices = names.len();
            devices.extend(names);
        }

        (devices, current)
    }
}

impl Drop for MusicSystem {
    fn drop(&mut self) {
        self.shutdown_music();
    }
}
