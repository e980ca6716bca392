//! 静音音乐后端
//!
//! 总能初始化成功，接受任何歌曲但不发声。作为音乐后端表的最后一项，
//! 保证在没有可用输出设备时调度器仍有一个活动后端。

use super::module::{MusicModule, SongHandle};
use crate::core::error::BackendResult;

#[derive(Debug, Default)]
pub struct SilentMusicModule {
    next_handle: u64,
    playing: Option<SongHandle>,
}

impl SilentMusicModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次开始且未停止的歌曲
    pub fn playing(&self) -> Option<SongHandle> {
        self.playing
    }
}

impl MusicModule for SilentMusicModule {
    fn name(&self) -> &str {
        "Silent"
    }

    fn init_music(&mut self, _device: usize) -> BackendResult<()> {
        tracing::info!(target: "music", "Music disabled, using the silent module");
        Ok(())
    }

    fn shutdown_music(&mut self) {
        self.playing = None;
    }

    fn set_music_volume(&mut self, _volume: i32) {}

    fn pause_song(&mut self, _handle: SongHandle) {}

    fn resume_song(&mut self, _handle: SongHandle) {}

    fn register_song(&mut self, _data: &[u8]) -> BackendResult<SongHandle> {
        self.next_handle += 1;
        Ok(SongHandle(self.next_handle))
    }

    fn play_song(&mut self, handle: SongHandle, _looping: bool) {
        self.playing = Some(handle);
    }

    fn stop_song(&mut self, handle: SongHandle) {
        if self.playing == Some(handle) {
            self.playing = None;
        }
    }

    fn unregister_song(&mut self, handle: SongHandle) {
        self.stop_song(handle);
    }

    fn device_list(&self) -> (Vec<String>, usize) {
        (vec!["None".to_string()], 0)
    }
}
