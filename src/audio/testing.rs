//! 测试用的记录型后端

use super::channel::{ChannelId, NORM_SEP};
use super::module::{AdjustedParams, MusicModule, PitchStep, SongHandle, SoundModule, SoundOrigin};
use super::sfx::{get_sfx_lump_num, SfxInfo};
use crate::core::error::{BackendError, BackendResult};
use crate::resources::LumpSource;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// 多个模块共享的调用记录
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: String) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn contains(&self, call: &str) -> bool {
        self.0.borrow().iter().any(|c| c == call)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

/// 记录型音效模块
pub struct FakeSoundModule {
    pub name: String,
    pub log: CallLog,
    pub fail_init: bool,
    pub fail_reinit: bool,
    pub fail_cache: bool,
    pub fail_start: bool,
    playing: HashSet<ChannelId>,
}

impl FakeSoundModule {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_init: false,
            fail_reinit: false,
            fail_cache: false,
            fail_start: false,
            playing: HashSet::new(),
        }
    }

    fn record(&self, call: String) {
        self.log.push(format!("{}:{}", self.name, call));
    }
}

impl SoundModule for FakeSoundModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_sound(&mut self) -> BackendResult<()> {
        self.record("init".into());
        if self.fail_init {
            Err(BackendError::Unavailable("fake".into()))
        } else {
            Ok(())
        }
    }

    fn reinit_sound(&mut self) -> BackendResult<()> {
        self.record("reinit".into());
        if self.fail_reinit {
            Err(BackendError::Unavailable("fake".into()))
        } else {
            Ok(())
        }
    }

    fn allow_reinit_sound(&self) -> bool {
        true
    }

    fn update_listener_params(&mut self, _listener: &SoundOrigin) {
        self.record("listener".into());
    }

    fn cache_sound(&mut self, sfx: &mut SfxInfo, lumps: &dyn LumpSource) -> bool {
        self.record(format!("cache({})", sfx.name));
        !self.fail_cache && get_sfx_lump_num(sfx, lumps).is_some()
    }

    fn adjust_sound_params(
        &self,
        _listener: &SoundOrigin,
        _source: &SoundOrigin,
        chanvol: i32,
    ) -> Option<AdjustedParams> {
        (chanvol > 0).then_some(AdjustedParams {
            volume: chanvol,
            separation: NORM_SEP,
            priority: 0,
        })
    }

    fn update_sound_params(&mut self, channel: ChannelId, volume: i32, separation: i32) {
        self.record(format!("update({},{},{})", channel.index(), volume, separation));
    }

    fn start_sound(&mut self, channel: ChannelId, sfx: &SfxInfo, pitch: PitchStep) -> bool {
        self.record(format!("start({},{},{})", channel.index(), sfx.name, pitch.pitch));
        if self.fail_start {
            return false;
        }
        self.playing.insert(channel);
        true
    }

    fn stop_sound(&mut self, channel: ChannelId) {
        self.record(format!("stop({})", channel.index()));
        self.playing.remove(&channel);
    }

    fn sound_is_playing(&self, channel: ChannelId) -> bool {
        self.playing.contains(&channel)
    }

    fn shutdown_sound(&mut self) {
        self.record("shutdown_sound".into());
        self.playing.clear();
    }

    fn shutdown_module(&mut self) {
        self.record("shutdown_module".into());
        self.playing.clear();
    }

    fn defer_updates(&mut self) {
        self.record("defer".into());
    }

    fn process_updates(&mut self) {
        self.record("process".into());
    }
}

/// 记录型音乐模块
pub struct FakeMusicModule {
    pub name: String,
    pub log: CallLog,
    pub devices: Vec<String>,
    /// 初始化会失败的本地设备，`None` 表示全部失败
    pub failing_devices: Option<Vec<usize>>,
    pub conflicts: bool,
    pub selected: usize,
    initialized: bool,
    next_handle: u64,
}

impl FakeMusicModule {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            devices: vec![format!("{} device", name)],
            failing_devices: Some(Vec::new()),
            conflicts: false,
            selected: 0,
            initialized: false,
            next_handle: 1,
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing_devices = None;
        self
    }

    pub fn with_devices(mut self, count: usize) -> Self {
        self.devices = (0..count).map(|i| format!("{} {}", self.name, i)).collect();
        self
    }

    pub fn conflicting(mut self) -> Self {
        self.conflicts = true;
        self
    }

    fn record(&self, call: String) {
        self.log.push(format!("{}:{}", self.name, call));
    }
}

impl MusicModule for FakeMusicModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_music(&mut self, device: usize) -> BackendResult<()> {
        self.record(format!("init({})", device));
        let fails = match &self.failing_devices {
            None => true,
            Some(devices) => devices.contains(&device),
        };
        if fails {
            return Err(BackendError::Unavailable(self.name.clone()));
        }
        self.initialized = true;
        self.selected = device;
        Ok(())
    }

    fn shutdown_music(&mut self) {
        self.record("shutdown".into());
        self.initialized = false;
    }

    fn set_music_volume(&mut self, volume: i32) {
        self.record(format!("volume({})", volume));
    }

    fn pause_song(&mut self, handle: SongHandle) {
        self.record(format!("pause({})", handle.0));
    }

    fn resume_song(&mut self, handle: SongHandle) {
        self.record(format!("resume({})", handle.0));
    }

    fn register_song(&mut self, data: &[u8]) -> BackendResult<SongHandle> {
        self.record(format!("register({})", data.len()));
        let handle = SongHandle(self.next_handle);
        self.next_handle += 1;
        Ok(handle)
    }

    fn play_song(&mut self, handle: SongHandle, looping: bool) {
        self.record(format!("play({},{})", handle.0, looping));
    }

    fn update_music(&mut self) {
        self.record("update".into());
    }

    fn stop_song(&mut self, handle: SongHandle) {
        self.record(format!("stop({})", handle.0));
    }

    fn unregister_song(&mut self, handle: SongHandle) {
        self.record(format!("unregister({})", handle.0));
    }

    fn device_list(&self) -> (Vec<String>, usize) {
        (self.devices.clone(), self.selected)
    }

    fn conflicts_with_streaming(&self) -> bool {
        self.conflicts
    }
}
