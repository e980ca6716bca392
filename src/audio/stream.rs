//! 流式音乐后端
//!
//! 非 MIDI 歌曲（WAV/OGG/MP3/FLAC）直接交给 `rodio::Decoder` 解码播放。
//! 注册时只做格式探测，播放时才创建解码器，循环播放使用 `Decoder::new_looped`。

use super::module::{MusicModule, SongHandle};
use crate::config::MAX_VOLUME;
use crate::core::error::{BackendError, BackendResult};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::collections::HashMap;
use std::io::Cursor;

/// 检查数据能否被解码
pub fn probe_song(data: &[u8]) -> BackendResult<()> {
    Decoder::new(Cursor::new(data.to_vec()))
        .map(|_| ())
        .map_err(|e| BackendError::InvalidData(e.to_string()))
}

/// 流式音乐模块
pub struct StreamMusicModule {
    stream: Option<OutputStream>,
    sink: Option<Sink>,
    songs: HashMap<SongHandle, Vec<u8>>,
    next_handle: u64,
    volume: f32,
}

impl StreamMusicModule {
    pub fn new() -> Self {
        Self {
            stream: None,
            sink: None,
            songs: HashMap::new(),
            next_handle: 1,
            volume: 1.0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    /// 当前是否有未暂停的歌曲在播放
    pub fn is_playing(&self) -> bool {
        self.sink
            .as_ref()
            .is_some_and(|sink| !sink.empty() && !sink.is_paused())
    }

    pub fn registered_songs(&self) -> usize {
        self.songs.len()
    }

    fn start(&mut self, data: Vec<u8>, looping: bool) -> BackendResult<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(BackendError::NotInitialized);
        };

        let sink = Sink::connect_new(stream.mixer());
        sink.set_volume(self.volume);
        let cursor = Cursor::new(data);
        if looping {
            let source =
                Decoder::new_looped(cursor).map_err(|e| BackendError::InvalidData(e.to_string()))?;
            sink.append(source);
        } else {
            let source = Decoder::new(cursor).map_err(|e| BackendError::InvalidData(e.to_string()))?;
            sink.append(source);
        }

        if let Some(old) = self.sink.replace(sink) {
            old.stop();
        }
        Ok(())
    }
}

impl Default for StreamMusicModule {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicModule for StreamMusicModule {
    fn name(&self) -> &str {
        "Streaming"
    }

    fn init_music(&mut self, _device: usize) -> BackendResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        stream.log_on_drop(false);
        self.stream = Some(stream);

        tracing::info!(target: "stream", "Streaming music output opened");
        Ok(())
    }

    fn shutdown_music(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.songs.clear();
        self.stream = None;
    }

    fn set_music_volume(&mut self, volume: i32) {
        self.volume = volume.clamp(0, MAX_VOLUME) as f32 / MAX_VOLUME as f32;
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    fn pause_song(&mut self, _handle: SongHandle) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume_song(&mut self, _handle: SongHandle) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn register_song(&mut self, data: &[u8]) -> BackendResult<SongHandle> {
        if self.stream.is_none() {
            return Err(BackendError::NotInitialized);
        }
        probe_song(data)?;

        let handle = SongHandle(self.next_handle);
        self.next_handle += 1;
        self.songs.insert(handle, data.to_vec());
        Ok(handle)
    }

    fn play_song(&mut self, handle: SongHandle, looping: bool) {
        let Some(data) = self.songs.get(&handle).cloned() else {
            tracing::warn!(target: "stream", "Song {:?} is not registered", handle);
            return;
        };
        if let Err(e) = self.start(data, looping) {
            tracing::warn!(target: "stream", "Failed to start song {:?}: {}", handle, e);
        }
    }

    fn stop_song(&mut self, _handle: SongHandle) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn unregister_song(&mut self, handle: SongHandle) {
        self.songs.remove(&handle);
    }

    fn device_list(&self) -> (Vec<String>, usize) {
        (vec!["Default output".to_string()], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8 kHz 单声道 16 位 PCM WAV
    fn wav_bytes(samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // 单声道
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&16000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_probe_accepts_wav() {
        assert!(probe_song(&wav_bytes(&[0, 1000, -1000, 0])).is_ok());
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(matches!(
            probe_song(b"this is not a song"),
            Err(BackendError::InvalidData(_))
        ));
    }

    #[test]
    fn test_uninitialized_module() {
        let mut module = StreamMusicModule::new();
        assert!(!module.is_initialized());
        assert!(matches!(
            module.register_song(&wav_bytes(&[0; 8])),
            Err(BackendError::NotInitialized)
        ));

        // 未注册的句柄只记录警告
        module.play_song(SongHandle(7), true);
        module.pause_song(SongHandle(7));
        module.stop_song(SongHandle(7));
        assert!(!module.is_playing());
        module.shutdown_music();
    }

    #[test]
    fn test_volume_is_remembered_before_playback() {
        let mut module = StreamMusicModule::new();
        module.set_music_volume(30);
        assert_eq!(module.volume, 1.0);
        module.set_music_volume(5);
        assert!((module.volume - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_device_list() {
        let module = StreamMusicModule::default();
        let (names, current) = module.device_list();
        assert_eq!(names.len(), 1);
        assert_eq!(current, 0);
        assert!(!module.conflicts_with_streaming());
    }
}
