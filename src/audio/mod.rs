//! 音效与音乐子系统
//!
//! - [`sound::SoundSystem`]: 固定通道池 + 当前音效模块
//! - [`music::MusicSystem`]: 多个音乐模块之间的选择、降级与转发
//! - [`module`]: 后端需要实现的接口
//!
//! 自带后端：
//! - [`mixer::MixerSoundModule`] / [`mixer::PositionalSoundModule`]：基于 rodio 的音效输出
//! - [`stream::StreamMusicModule`]：rodio 解码的流式音乐
//! - [`sequencer::SequencerMusicModule`]：驱动 MIDI 音频图的音序器
//! - [`silent::SilentMusicModule`]：静音后端，保证总能初始化

pub mod channel;
pub mod mixer;
pub mod module;
pub mod music;
pub mod sequencer;
pub mod sfx;
pub mod silent;
pub mod sound;
pub mod spatial;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelId, ChannelPool, ChannelSlot, StepTable, MAX_CHANNELS, NORM_PITCH, NORM_SEP};
pub use mixer::{MixerSoundModule, PositionalSoundModule};
pub use module::{AdjustedParams, MusicModule, PitchStep, SongHandle, SoundModule, SoundOrigin};
pub use music::{resolve_device, select_backend, MusicModuleEntry, MusicSystem};
pub use sequencer::{GraphStatus, HeadlessGraph, MidiGraph, SequencerMusicModule};
pub use sfx::{get_sfx_lump_num, LumpCache, SfxId, SfxInfo, SfxTable};
pub use silent::SilentMusicModule;
pub use sound::SoundSystem;
pub use spatial::{DistanceModel, Listener, SpatialParams};
pub use stream::StreamMusicModule;
