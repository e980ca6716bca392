//! MIDI 音序器后端
//!
//! [`SequencerMusicModule`] 驱动一个抽象的 MIDI 音频图：合成器节点接到输出节点，
//! 音序播放器把已加载的标准 MIDI 序列送进图里。原生平台 API 通过实现 [`MidiGraph`] 接入。
//!
//! 时间单位是拍（四分音符）。播放器不会自己循环，`update_music` 每个 tick 检查一次，
//! 到达最长音轨的结尾时：循环歌曲把时间拨回 0，否则停止播放器。
//!
//! [`HeadlessGraph`] 是不发声的实现：只按真实时间推进播放位置，适合没有 MIDI 合成器的环境。

use super::module::{MusicModule, SongHandle};
use crate::config::MAX_VOLUME;
use crate::core::error::{BackendError, BackendResult};
use crate::formats::{looks_like_midi, mus2mid, parse_smf, SmfInfo};
use std::fmt;
use std::time::Instant;

/// 原生调用返回的状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStatus(pub i32);

impl fmt::Display for GraphStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

pub type GraphResult<T> = Result<T, GraphStatus>;

/// MIDI 音频图与音序播放器
pub trait MidiGraph {
    /// 图中节点
    type Node: Copy;
    /// 已创建的音乐序列
    type Sequence;

    fn new_graph(&mut self) -> GraphResult<()>;
    fn add_synth_node(&mut self) -> GraphResult<Self::Node>;
    fn add_output_node(&mut self) -> GraphResult<Self::Node>;
    fn connect_nodes(&mut self, source: Self::Node, destination: Self::Node) -> GraphResult<()>;
    fn open_graph(&mut self) -> GraphResult<()>;
    fn initialize_graph(&mut self) -> GraphResult<()>;
    /// 取得输出节点的音频单元，之后的增益设置作用于它
    fn bind_output_unit(&mut self, output: Self::Node) -> GraphResult<()>;
    fn new_player(&mut self) -> GraphResult<()>;
    fn dispose_player(&mut self);
    fn dispose_graph(&mut self);

    /// 输出线性增益 (0.0 - 1.0)
    fn set_output_gain(&mut self, gain: f32) -> GraphResult<()>;

    fn new_sequence(&mut self) -> GraphResult<Self::Sequence>;
    fn load_smf(&mut self, sequence: &mut Self::Sequence, data: &[u8]) -> GraphResult<()>;
    fn dispose_sequence(&mut self, sequence: Self::Sequence);
    /// 让序列驱动本图
    fn attach_sequence(&mut self, sequence: &mut Self::Sequence) -> GraphResult<()>;
    /// 在播放器上设置序列，`None` 解除关联
    fn set_player_sequence(&mut self, sequence: Option<&Self::Sequence>) -> GraphResult<()>;
    /// 各音轨长度（拍）
    fn track_lengths(&mut self, sequence: &Self::Sequence) -> GraphResult<Vec<f64>>;

    fn preroll(&mut self) -> GraphResult<()>;
    fn set_time(&mut self, beats: f64) -> GraphResult<()>;
    fn get_time(&mut self) -> GraphResult<f64>;
    fn start(&mut self) -> GraphResult<()>;
    fn stop(&mut self) -> GraphResult<()>;
}

/// 记录失败的原生调用
fn checked<T>(step: &'static str, result: GraphResult<T>) -> BackendResult<T> {
    result.map_err(|status| {
        tracing::error!(target: "sequencer", "{} failed ({})", step, status);
        BackendError::native(step, status.to_string())
    })
}

/// MIDI 音序器音乐模块
pub struct SequencerMusicModule<G: MidiGraph> {
    graph: G,
    sequence: Option<G::Sequence>,
    current: Option<SongHandle>,
    next_handle: u64,
    end_time: f64,
    initialized: bool,
    is_playing: bool,
    is_looping: bool,
}

impl<G: MidiGraph> SequencerMusicModule<G> {
    pub fn new(graph: G) -> Self {
        Self {
            graph,
            sequence: None,
            current: None,
            next_handle: 1,
            end_time: 0.0,
            initialized: false,
            is_playing: false,
            is_looping: false,
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// 当前歌曲的结束时间（拍）
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    fn build_graph(&mut self) -> BackendResult<()> {
        let synth = checked("add_synth_node", self.graph.add_synth_node())?;
        let output = checked("add_output_node", self.graph.add_output_node())?;
        checked("connect_nodes", self.graph.connect_nodes(synth, output))?;
        checked("open_graph", self.graph.open_graph())?;
        checked("initialize_graph", self.graph.initialize_graph())?;
        checked("bind_output_unit", self.graph.bind_output_unit(output))?;
        checked("new_player", self.graph.new_player())?;
        Ok(())
    }

    fn start_playback(&mut self) -> BackendResult<f64> {
        let Some(sequence) = self.sequence.as_mut() else {
            return Err(BackendError::InvalidData("no sequence loaded".into()));
        };

        checked("attach_sequence", self.graph.attach_sequence(sequence))?;
        checked("set_player_sequence", self.graph.set_player_sequence(Some(sequence)))?;
        checked("preroll", self.graph.preroll())?;
        let lengths = checked("track_lengths", self.graph.track_lengths(sequence))?;
        let end_time = lengths.into_iter().fold(0.0, f64::max);
        checked("set_time", self.graph.set_time(0.0))?;
        checked("start", self.graph.start())?;
        Ok(end_time)
    }

    fn dispose_current(&mut self) {
        if let Some(sequence) = self.sequence.take() {
            self.graph.dispose_sequence(sequence);
        }
        self.current = None;
    }
}

impl<G: MidiGraph> MusicModule for SequencerMusicModule<G> {
    fn name(&self) -> &str {
        "Native MIDI"
    }

    fn init_music(&mut self, _device: usize) -> BackendResult<()> {
        if self.initialized {
            return Ok(());
        }

        checked("new_graph", self.graph.new_graph())?;
        if let Err(e) = self.build_graph() {
            self.graph.dispose_graph();
            return Err(e);
        }

        tracing::info!(target: "sequencer", "Music playback enabled using the MIDI sequencer");
        self.initialized = true;
        Ok(())
    }

    fn shutdown_music(&mut self) {
        if !self.initialized {
            return;
        }

        if let Some(handle) = self.current {
            self.stop_song(handle);
            self.unregister_song(handle);
        }
        self.graph.dispose_player();
        self.graph.dispose_graph();
        self.initialized = false;
    }

    fn set_music_volume(&mut self, volume: i32) {
        if !self.initialized {
            return;
        }
        let gain = volume.clamp(0, MAX_VOLUME) as f32 / MAX_VOLUME as f32;
        let _ = checked("set_output_gain", self.graph.set_output_gain(gain));
    }

    fn pause_song(&mut self, _handle: SongHandle) {
        if !self.initialized {
            return;
        }
        let _ = checked("stop", self.graph.stop());
    }

    fn resume_song(&mut self, _handle: SongHandle) {
        if !self.initialized {
            return;
        }
        let _ = checked("start", self.graph.start());
    }

    fn register_song(&mut self, data: &[u8]) -> BackendResult<SongHandle> {
        if !self.initialized {
            return Err(BackendError::NotInitialized);
        }

        if let Some(handle) = self.current {
            self.stop_song(handle);
            self.dispose_current();
        }

        let mut sequence = checked("new_sequence", self.graph.new_sequence())?;

        let midi = if looks_like_midi(data) {
            Ok(data.to_vec())
        } else {
            mus2mid(data)
        };
        let midi = match midi {
            Ok(midi) => midi,
            Err(e) => {
                tracing::error!(target: "sequencer", "Failed to load MIDI: {}", e);
                self.graph.dispose_sequence(sequence);
                return Err(BackendError::InvalidData(e.to_string()));
            }
        };

        if let Err(e) = checked("load_smf", self.graph.load_smf(&mut sequence, &midi)) {
            self.graph.dispose_sequence(sequence);
            return Err(e);
        }

        let handle = SongHandle(self.next_handle);
        self.next_handle += 1;
        self.sequence = Some(sequence);
        self.current = Some(handle);
        Ok(handle)
    }

    fn play_song(&mut self, handle: SongHandle, looping: bool) {
        if !self.initialized {
            return;
        }
        if self.current != Some(handle) {
            tracing::warn!(target: "sequencer", "Song {:?} is not registered", handle);
            return;
        }

        if let Ok(end_time) = self.start_playback() {
            self.end_time = end_time;
            self.is_playing = true;
            self.is_looping = looping;
        }
    }

    fn update_music(&mut self) {
        if !self.initialized || !self.is_playing {
            return;
        }

        let Ok(time) = checked("get_time", self.graph.get_time()) else {
            return;
        };
        if time < self.end_time {
            return;
        }
        if self.is_looping {
            let _ = checked("set_time", self.graph.set_time(0.0));
        } else {
            tracing::debug!(target: "sequencer", "Song finished at beat {:.2}", time);
            let _ = checked("stop", self.graph.stop());
            self.is_playing = false;
        }
    }

    fn stop_song(&mut self, _handle: SongHandle) {
        if !self.initialized {
            return;
        }
        let _ = checked("stop", self.graph.stop());
        // 释放序列前必须先与播放器解除关联
        let _ = checked("set_player_sequence", self.graph.set_player_sequence(None));
        self.is_playing = false;
    }

    fn unregister_song(&mut self, handle: SongHandle) {
        if !self.initialized || self.current != Some(handle) {
            return;
        }
        self.dispose_current();
    }

    fn device_list(&self) -> (Vec<String>, usize) {
        (vec!["Native".to_string()], 0)
    }
}

/// 不发声的 MIDI 图，按真实时间推进播放位置
#[derive(Debug, Default)]
pub struct HeadlessGraph {
    graph_open: bool,
    has_player: bool,
    gain: f32,
    player_song: Option<SmfInfo>,
    position: f64,
    started_at: Option<Instant>,
}

/// [`HeadlessGraph`] 的序列
#[derive(Debug, Default)]
pub struct HeadlessSequence {
    info: Option<SmfInfo>,
}

impl HeadlessGraph {
    pub fn new() -> Self {
        Self {
            gain: 1.0,
            ..Self::default()
        }
    }

    /// 当前输出增益
    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn current_position(&self) -> f64 {
        let bps = self
            .player_song
            .as_ref()
            .map_or(0.0, SmfInfo::beats_per_second);
        match self.started_at {
            Some(start) => self.position + start.elapsed().as_secs_f64() * bps,
            None => self.position,
        }
    }
}

const STATUS_NOT_READY: GraphStatus = GraphStatus(-1);
const STATUS_INVALID_DATA: GraphStatus = GraphStatus(-2);

impl MidiGraph for HeadlessGraph {
    type Node = u32;
    type Sequence = HeadlessSequence;

    fn new_graph(&mut self) -> GraphResult<()> {
        self.graph_open = false;
        Ok(())
    }

    fn add_synth_node(&mut self) -> GraphResult<u32> {
        Ok(0)
    }

    fn add_output_node(&mut self) -> GraphResult<u32> {
        Ok(1)
    }

    fn connect_nodes(&mut self, _source: u32, _destination: u32) -> GraphResult<()> {
        Ok(())
    }

    fn open_graph(&mut self) -> GraphResult<()> {
        self.graph_open = true;
        Ok(())
    }

    fn initialize_graph(&mut self) -> GraphResult<()> {
        if self.graph_open {
            Ok(())
        } else {
            Err(STATUS_NOT_READY)
        }
    }

    fn bind_output_unit(&mut self, _output: u32) -> GraphResult<()> {
        Ok(())
    }

    fn new_player(&mut self) -> GraphResult<()> {
        self.has_player = true;
        Ok(())
    }

    fn dispose_player(&mut self) {
        self.has_player = false;
        self.player_song = None;
        self.started_at = None;
    }

    fn dispose_graph(&mut self) {
        self.graph_open = false;
    }

    fn set_output_gain(&mut self, gain: f32) -> GraphResult<()> {
        self.gain = gain;
        Ok(())
    }

    fn new_sequence(&mut self) -> GraphResult<HeadlessSequence> {
        Ok(HeadlessSequence::default())
    }

    fn load_smf(&mut self, sequence: &mut HeadlessSequence, data: &[u8]) -> GraphResult<()> {
        let info = parse_smf(data).map_err(|_| STATUS_INVALID_DATA)?;
        sequence.info = Some(info);
        Ok(())
    }

    fn dispose_sequence(&mut self, _sequence: HeadlessSequence) {}

    fn attach_sequence(&mut self, sequence: &mut HeadlessSequence) -> GraphResult<()> {
        if sequence.info.is_some() && self.graph_open {
            Ok(())
        } else {
            Err(STATUS_NOT_READY)
        }
    }

    fn set_player_sequence(&mut self, sequence: Option<&HeadlessSequence>) -> GraphResult<()> {
        if !self.has_player {
            return Err(STATUS_NOT_READY);
        }
        self.player_song = sequence.and_then(|s| s.info.clone());
        self.position = 0.0;
        self.started_at = None;
        Ok(())
    }

    fn track_lengths(&mut self, sequence: &HeadlessSequence) -> GraphResult<Vec<f64>> {
        sequence
            .info
            .as_ref()
            .map(SmfInfo::track_beats)
            .ok_or(STATUS_INVALID_DATA)
    }

    fn preroll(&mut self) -> GraphResult<()> {
        if self.player_song.is_some() {
            Ok(())
        } else {
            Err(STATUS_NOT_READY)
        }
    }

    fn set_time(&mut self, beats: f64) -> GraphResult<()> {
        self.position = beats;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn get_time(&mut self) -> GraphResult<f64> {
        Ok(self.current_position())
    }

    fn start(&mut self) -> GraphResult<()> {
        if self.player_song.is_none() {
            return Err(STATUS_NOT_READY);
        }
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn stop(&mut self) -> GraphResult<()> {
        self.position = self.current_position();
        self.started_at = None;
        Ok(())
    }
}
