//! 软件混音音效后端
//!
//! 两个后端共用同一条输出路径：`rodio` 默认输出流，每个通道一个 `Sink`，
//! 音效 lump 解码为单声道 `f32` 后缓存。立体声分离通过 `PannedSource`
//! 实时读取通道增益完成，音高通过 `Sink::set_speed` 完成。
//!
//! - [`MixerSoundModule`] 使用经典的距离/角度衰减
//! - [`PositionalSoundModule`] 使用 [`DistanceModel`] 与等功率平移，支持批量更新

use super::channel::{ChannelId, MAX_CHANNELS, NORM_SEP};
use super::module::{AdjustedParams, PitchStep, SoundModule, SoundOrigin};
use super::sfx::{get_sfx_lump_num, SfxInfo};
use super::spatial::{calculate_params, DistanceModel, Listener};
use crate::core::error::{BackendError, BackendResult};
use crate::formats::decode_dmx;
use crate::formats::dmx::is_dmx;
use crate::resources::LumpSource;
use rodio::{ChannelCount, Decoder, OutputStream, OutputStreamBuilder, SampleRate, Sink, Source};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 超过该距离的声音听不到
pub const S_CLIPPING_DIST: f32 = 1200.0;

/// 该距离以内满音量
pub const S_CLOSE_DIST: f32 = 200.0;

/// 左右分离的摆幅
pub const S_STEREO_SWING: f32 = 96.0;

/// 通道音量上限
const MAX_CHANNEL_VOLUME: i32 = 127;

/// 由音量与分离度计算左右声道线性增益
///
/// 分离度 0 为最左、255 为最右；结果钳制在 0.0 - 1.0。
pub fn stereo_gains(volume: i32, separation: i32) -> (f32, f32) {
    let volume = volume.clamp(0, MAX_CHANNEL_VOLUME) as f32;
    let separation = separation.clamp(0, 254) as f32;
    let scale = (MAX_CHANNEL_VOLUME * MAX_CHANNEL_VOLUME) as f32;

    let left = (254.0 - separation) * volume / scale;
    let right = separation * volume / scale;
    (left.clamp(0.0, 1.0), right.clamp(0.0, 1.0))
}

/// 经典衰减：近似距离决定音量，相对方位决定分离度
pub fn classic_adjust(
    listener: &SoundOrigin,
    source: &SoundOrigin,
    chanvol: i32,
) -> Option<AdjustedParams> {
    let dx = source.position.x - listener.position.x;
    let dy = source.position.y - listener.position.y;
    let adx = dx.abs();
    let ady = dy.abs();

    // 八边形近似距离
    let dist = adx + ady - adx.min(ady) / 2.0;
    if dist > S_CLIPPING_DIST {
        return None;
    }

    let separation = if dist < 1.0 {
        NORM_SEP
    } else {
        let angle = dy.atan2(dx) - listener.angle;
        NORM_SEP - (S_STEREO_SWING * angle.sin()).round() as i32
    };

    let volume = if dist < S_CLOSE_DIST {
        chanvol
    } else {
        (chanvol as f32 * (S_CLIPPING_DIST - dist) / (S_CLIPPING_DIST - S_CLOSE_DIST)) as i32
    };

    if volume <= 0 {
        return None;
    }

    Some(AdjustedParams {
        volume,
        separation,
        priority: MAX_CHANNEL_VOLUME - volume,
    })
}

/// 通道的左右增益，音频线程与游戏线程共享
#[derive(Debug)]
struct ChannelGains {
    left: AtomicU32,
    right: AtomicU32,
}

impl ChannelGains {
    fn new() -> Self {
        Self {
            left: AtomicU32::new(0.5f32.to_bits()),
            right: AtomicU32::new(0.5f32.to_bits()),
        }
    }

    fn set(&self, (left, right): (f32, f32)) {
        self.left.store(left.to_bits(), Ordering::Relaxed);
        self.right.store(right.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> (f32, f32) {
        (
            f32::from_bits(self.left.load(Ordering::Relaxed)),
            f32::from_bits(self.right.load(Ordering::Relaxed)),
        )
    }
}

/// 解码后缓存的音效
#[derive(Debug, Clone)]
struct CachedSound {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

/// 把单声道样本展开成交错立体声，逐帧读取通道增益
struct PannedSource {
    samples: Arc<[f32]>,
    sample_rate: u32,
    pos: usize,
    right_next: bool,
    frame_gains: (f32, f32),
    gains: Arc<ChannelGains>,
}

impl PannedSource {
    fn new(sound: &CachedSound, gains: Arc<ChannelGains>) -> Self {
        Self {
            samples: Arc::clone(&sound.samples),
            sample_rate: sound.sample_rate,
            pos: 0,
            right_next: false,
            frame_gains: (0.0, 0.0),
            gains,
        }
    }
}

impl Iterator for PannedSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = *self.samples.get(self.pos)?;
        if self.right_next {
            self.right_next = false;
            self.pos += 1;
            Some(sample * self.frame_gains.1)
        } else {
            self.frame_gains = self.gains.get();
            self.right_next = true;
            Some(sample * self.frame_gains.0)
        }
    }
}

impl Source for PannedSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> ChannelCount {
        2
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        if self.sample_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.samples.len() as f64 / f64::from(self.sample_rate),
        ))
    }
}

/// 解码音效 lump：DMX 直接转换，其它格式交给 rodio 并混为单声道
fn decode_lump(data: &[u8]) -> BackendResult<CachedSound> {
    if is_dmx(data) {
        let sound = decode_dmx(data).map_err(|e| BackendError::InvalidData(e.to_string()))?;
        return Ok(CachedSound {
            samples: sound.samples.into(),
            sample_rate: sound.sample_rate,
        });
    }

    let decoder = Decoder::new(Cursor::new(data.to_vec()))
        .map_err(|e| BackendError::InvalidData(e.to_string()))?;
    let channels = usize::from(decoder.channels().max(1));
    let sample_rate = decoder.sample_rate();
    if sample_rate == 0 {
        return Err(BackendError::InvalidData("sample rate is 0".into()));
    }
    let interleaved: Vec<f32> = decoder.collect();

    let samples: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(CachedSound {
        samples: samples.into(),
        sample_rate,
    })
}

/// 打开的输出流与每通道的 Sink
struct SinkBank {
    stream: OutputStream,
    sinks: Vec<Option<Sink>>,
}

impl SinkBank {
    fn open() -> BackendResult<Self> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        stream.log_on_drop(false);
        Ok(Self {
            stream,
            sinks: (0..MAX_CHANNELS).map(|_| None).collect(),
        })
    }

    fn stop_all(&mut self) {
        for sink in self.sinks.iter_mut().filter_map(Option::take) {
            sink.stop();
        }
    }
}

/// 两个混音后端共用的输出与缓存
struct MixerCore {
    output: Option<SinkBank>,
    cache: HashMap<usize, CachedSound>,
    gains: Vec<Arc<ChannelGains>>,
}

impl MixerCore {
    fn new() -> Self {
        Self {
            output: None,
            cache: HashMap::new(),
            gains: (0..MAX_CHANNELS).map(|_| Arc::new(ChannelGains::new())).collect(),
        }
    }

    fn open(&mut self) -> BackendResult<()> {
        if self.output.is_none() {
            self.output = Some(SinkBank::open()?);
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop_all();
        }
    }

    fn cache_sound(&mut self, sfx: &mut SfxInfo, lumps: &dyn LumpSource) -> bool {
        let Some(lump) = get_sfx_lump_num(sfx, lumps) else {
            return false;
        };
        if self.cache.contains_key(&lump) {
            return true;
        }

        let Some(data) = lumps.lump_data(lump) else {
            return false;
        };
        match decode_lump(data) {
            Ok(sound) => {
                self.cache.insert(lump, sound);
                true
            }
            Err(e) => {
                tracing::warn!(target: "mixer", "Failed to decode {}: {}", sfx.lump_name(), e);
                false
            }
        }
    }

    fn set_params(&mut self, channel: ChannelId, volume: i32, separation: i32) {
        self.gains[channel.index()].set(stereo_gains(volume, separation));
    }

    fn start(&mut self, channel: ChannelId, sfx: &SfxInfo, pitch: PitchStep) -> bool {
        let Some(sound) = sfx.lumpnum.lump().and_then(|lump| self.cache.get(&lump)) else {
            return false;
        };
        let Some(output) = self.output.as_mut() else {
            return false;
        };

        let sink = Sink::connect_new(output.stream.mixer());
        sink.set_speed(pitch.step);
        sink.append(PannedSource::new(sound, Arc::clone(&self.gains[channel.index()])));

        // 替换掉的旧 Sink 在 drop 时停止
        output.sinks[channel.index()] = Some(sink);
        true
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(sink) = self
            .output
            .as_mut()
            .and_then(|output| output.sinks[channel.index()].take())
        {
            sink.stop();
        }
    }

    fn is_playing(&self, channel: ChannelId) -> bool {
        self.output
            .as_ref()
            .and_then(|output| output.sinks[channel.index()].as_ref())
            .is_some_and(|sink| !sink.empty())
    }

    fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// 经典软件混音后端
pub struct MixerSoundModule {
    core: MixerCore,
}

impl MixerSoundModule {
    pub fn new() -> Self {
        Self {
            core: MixerCore::new(),
        }
    }

    /// 已解码缓存的音效数
    pub fn cached_sounds(&self) -> usize {
        self.core.cached_count()
    }
}

impl Default for MixerSoundModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundModule for MixerSoundModule {
    fn name(&self) -> &str {
        "Software mixer"
    }

    fn init_sound(&mut self) -> BackendResult<()> {
        self.core.open()?;
        tracing::info!(target: "mixer", "Software mixer opened on the default output device");
        Ok(())
    }

    fn reinit_sound(&mut self) -> BackendResult<()> {
        self.core.open()
    }

    fn allow_reinit_sound(&self) -> bool {
        true
    }

    fn cache_sound(&mut self, sfx: &mut SfxInfo, lumps: &dyn LumpSource) -> bool {
        self.core.cache_sound(sfx, lumps)
    }

    fn adjust_sound_params(
        &self,
        listener: &SoundOrigin,
        source: &SoundOrigin,
        chanvol: i32,
    ) -> Option<AdjustedParams> {
        classic_adjust(listener, source, chanvol)
    }

    fn update_sound_params(&mut self, channel: ChannelId, volume: i32, separation: i32) {
        self.core.set_params(channel, volume, separation);
    }

    fn start_sound(&mut self, channel: ChannelId, sfx: &SfxInfo, pitch: PitchStep) -> bool {
        self.core.start(channel, sfx, pitch)
    }

    fn stop_sound(&mut self, channel: ChannelId) {
        self.core.stop(channel);
    }

    fn sound_is_playing(&self, channel: ChannelId) -> bool {
        self.core.is_playing(channel)
    }

    fn shutdown_sound(&mut self) {
        self.core.close();
        self.core.cache.clear();
    }

    fn shutdown_module(&mut self) {
        self.core.close();
    }
}

/// 定位音效后端
///
/// 听者状态由 `update_listener_params` 提供；尚未提供时使用调用方传入的听者。
pub struct PositionalSoundModule {
    core: MixerCore,
    model: DistanceModel,
    listener: Option<Listener>,
    deferred: bool,
    pending: Vec<(ChannelId, i32, i32)>,
}

impl PositionalSoundModule {
    pub fn new(model: DistanceModel) -> Self {
        Self {
            core: MixerCore::new(),
            model,
            listener: None,
            deferred: false,
            pending: Vec::new(),
        }
    }

    pub fn listener(&self) -> Option<&Listener> {
        self.listener.as_ref()
    }

    /// 批量更新期间排队的参数变更数
    pub fn pending_updates(&self) -> usize {
        self.pending.len()
    }
}

impl Default for PositionalSoundModule {
    fn default() -> Self {
        Self::new(DistanceModel::default())
    }
}

impl SoundModule for PositionalSoundModule {
    fn name(&self) -> &str {
        "Positional mixer"
    }

    fn init_sound(&mut self) -> BackendResult<()> {
        self.core.open()?;
        tracing::info!(target: "mixer", "Positional mixer opened with {:?}", self.model);
        Ok(())
    }

    fn reinit_sound(&mut self) -> BackendResult<()> {
        self.core.open()
    }

    fn allow_reinit_sound(&self) -> bool {
        true
    }

    fn update_listener_params(&mut self, listener: &SoundOrigin) {
        self.listener = Some(Listener::from(listener));
    }

    fn cache_sound(&mut self, sfx: &mut SfxInfo, lumps: &dyn LumpSource) -> bool {
        self.core.cache_sound(sfx, lumps)
    }

    fn adjust_sound_params(
        &self,
        listener: &SoundOrigin,
        source: &SoundOrigin,
        chanvol: i32,
    ) -> Option<AdjustedParams> {
        let listener = self.listener.unwrap_or_else(|| Listener::from(listener));
        calculate_params(&listener, source.position, &self.model).to_adjusted(chanvol)
    }

    fn update_sound_params(&mut self, channel: ChannelId, volume: i32, separation: i32) {
        if self.deferred {
            self.pending.retain(|(queued, _, _)| *queued != channel);
            self.pending.push((channel, volume, separation));
        } else {
            self.core.set_params(channel, volume, separation);
        }
    }

    fn start_sound(&mut self, channel: ChannelId, sfx: &SfxInfo, pitch: PitchStep) -> bool {
        // 开始播放前先提交本通道排队的参数
        if let Some(index) = self.pending.iter().position(|(queued, _, _)| *queued == channel) {
            let (_, volume, separation) = self.pending.remove(index);
            self.core.set_params(channel, volume, separation);
        }
        self.core.start(channel, sfx, pitch)
    }

    fn stop_sound(&mut self, channel: ChannelId) {
        self.pending.retain(|(queued, _, _)| *queued != channel);
        self.core.stop(channel);
    }

    fn sound_is_playing(&self, channel: ChannelId) -> bool {
        self.core.is_playing(channel)
    }

    fn shutdown_sound(&mut self) {
        self.pending.clear();
        self.deferred = false;
        self.core.close();
        self.core.cache.clear();
    }

    fn shutdown_module(&mut self) {
        self.pending.clear();
        self.deferred = false;
        self.core.close();
    }

    fn defer_updates(&mut self) {
        self.deferred = true;
    }

    fn process_updates(&mut self) {
        self.deferred = false;
        for (channel, volume, separation) in self.pending.drain(..) {
            self.core.set_params(channel, volume, separation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sfx::{LumpCache, SfxTable};
    use crate::resources::{WadFile, WadKind};
    use glam::Vec3;

    fn dmx_lump(rate: u16, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![128u8; 16];
        payload.extend_from_slice(body);
        payload.extend_from_slice(&[128u8; 16]);

        let mut data = vec![0x03, 0x00];
        data.extend_from_slice(&rate.to_le_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);
        data
    }

    fn origin(x: f32, y: f32, angle: f32) -> SoundOrigin {
        SoundOrigin::new(Vec3::new(x, y, 0.0), angle)
    }

    #[test]
    fn test_stereo_gains() {
        let (left, right) = stereo_gains(127, 0);
        assert_eq!(right, 0.0);
        assert!(left > 0.99);

        let (left, right) = stereo_gains(127, 254);
        assert_eq!(left, 0.0);
        assert!(right > 0.99);

        let (left, right) = stereo_gains(0, NORM_SEP);
        assert_eq!((left, right), (0.0, 0.0));

        // 越界输入被钳制
        let (left, right) = stereo_gains(500, -20);
        assert!(left <= 1.0 && right == 0.0);
    }

    #[test]
    fn test_classic_adjust_close_source() {
        let params = classic_adjust(&origin(0.0, 0.0, 0.0), &origin(100.0, 0.0, 0.0), 120).unwrap();
        assert_eq!(params.volume, 120);
        // 正前方居中
        assert_eq!(params.separation, NORM_SEP);
        assert_eq!(params.priority, 7);
    }

    #[test]
    fn test_classic_adjust_same_position() {
        let params = classic_adjust(&origin(5.0, 5.0, 1.0), &origin(5.0, 5.0, 0.0), 64).unwrap();
        assert_eq!(params.volume, 64);
        assert_eq!(params.separation, NORM_SEP);
    }

    #[test]
    fn test_classic_adjust_attenuates_with_distance() {
        let params = classic_adjust(&origin(0.0, 0.0, 0.0), &origin(700.0, 0.0, 0.0), 100).unwrap();
        assert_eq!(params.volume, 50);

        assert_eq!(
            classic_adjust(&origin(0.0, 0.0, 0.0), &origin(1300.0, 0.0, 0.0), 127),
            None
        );
        assert_eq!(
            classic_adjust(&origin(0.0, 0.0, 0.0), &origin(1200.0, 0.0, 0.0), 127),
            None
        );
    }

    #[test]
    fn test_classic_adjust_separation_follows_side() {
        let listener = origin(0.0, 0.0, 0.0);
        // 面向 +x，+y 在左侧
        let left = classic_adjust(&listener, &origin(0.0, 100.0, 0.0), 100).unwrap();
        assert_eq!(left.separation, NORM_SEP - 96);
        let right = classic_adjust(&listener, &origin(0.0, -100.0, 0.0), 100).unwrap();
        assert_eq!(right.separation, NORM_SEP + 96);
    }

    #[test]
    fn test_panned_source_interleaves_with_live_gains() {
        let sound = CachedSound {
            samples: vec![1.0, -0.5].into(),
            sample_rate: 11025,
        };
        let gains = Arc::new(ChannelGains::new());
        gains.set((1.0, 0.25));

        let mut source = PannedSource::new(&sound, Arc::clone(&gains));
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 11025);
        assert_eq!(source.next(), Some(1.0));
        assert_eq!(source.next(), Some(0.25));

        gains.set((0.0, 1.0));
        assert_eq!(source.next(), Some(0.0));
        assert_eq!(source.next(), Some(-0.5));
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_decode_dmx_lump() {
        let sound = decode_lump(&dmx_lump(11025, &[255u8; 20])).unwrap();
        assert_eq!(sound.sample_rate, 11025);
        assert_eq!(sound.samples.len(), 20);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_lump(b"definitely not audio").is_err());
    }

    #[test]
    fn test_cache_sound_decodes_once() {
        let wad = WadFile::from_lumps(
            WadKind::Pwad,
            vec![("DSPISTOL", dmx_lump(11025, &[200u8; 32]))],
        );
        let mut table = SfxTable::with_sounds(&[("pistol", 64), ("bfg", 60)]);
        let mut module = MixerSoundModule::new();

        let pistol = table.find("pistol").unwrap();
        let sfx = table.get_mut(pistol).unwrap();
        assert!(module.cache_sound(sfx, &wad));
        assert!(module.cache_sound(sfx, &wad));
        assert_eq!(sfx.lumpnum, LumpCache::Found(0));
        assert_eq!(module.cached_sounds(), 1);

        let bfg = table.find("bfg").unwrap();
        assert!(!module.cache_sound(table.get_mut(bfg).unwrap(), &wad));
    }

    #[test]
    fn test_zero_rate_lump_is_not_cached() {
        let wad = WadFile::from_lumps(
            WadKind::Pwad,
            vec![("DSPISTOL", dmx_lump(0, &[200u8; 32]))],
        );
        let mut table = SfxTable::with_sounds(&[("pistol", 64)]);
        let id = table.find("pistol").unwrap();
        let mut module = MixerSoundModule::new();

        assert!(decode_lump(&dmx_lump(0, &[200u8; 32])).is_err());
        assert!(!module.cache_sound(table.get_mut(id).unwrap(), &wad));
        assert_eq!(module.cached_sounds(), 0);
    }

    #[test]
    fn test_start_without_output_fails() {
        let wad = WadFile::from_lumps(
            WadKind::Pwad,
            vec![("DSPISTOL", dmx_lump(11025, &[200u8; 32]))],
        );
        let mut table = SfxTable::with_sounds(&[("pistol", 64)]);
        let id = table.find("pistol").unwrap();
        let mut module = MixerSoundModule::new();
        assert!(module.cache_sound(table.get_mut(id).unwrap(), &wad));

        let channel = ChannelId::new(0).unwrap();
        let step = PitchStep { pitch: 128, step: 1.0 };
        assert!(!module.start_sound(channel, table.get(id).unwrap(), step));
        assert!(!module.sound_is_playing(channel));
        module.stop_sound(channel);
    }

    #[test]
    fn test_positional_uses_stored_listener() {
        let mut module = PositionalSoundModule::default();
        let source = origin(0.0, -300.0, 0.0);

        // 尚未提供听者时使用传入的听者
        let params = module
            .adjust_sound_params(&origin(0.0, 0.0, 0.0), &source, 100)
            .unwrap();
        assert_eq!(params.volume, 90);
        assert_eq!(params.separation, NORM_SEP + 127);

        module.update_listener_params(&origin(0.0, -300.0, 0.0));
        let params = module
            .adjust_sound_params(&origin(0.0, 0.0, 0.0), &source, 100)
            .unwrap();
        assert_eq!(params.volume, 100);
        assert!(module.listener().is_some());
    }

    #[test]
    fn test_positional_out_of_range_is_silent() {
        let module = PositionalSoundModule::default();
        assert_eq!(
            module.adjust_sound_params(&origin(0.0, 0.0, 0.0), &origin(2000.0, 0.0, 0.0), 127),
            None
        );
    }

    #[test]
    fn test_positional_deferred_updates() {
        let mut module = PositionalSoundModule::default();
        let a = ChannelId::new(1).unwrap();
        let b = ChannelId::new(2).unwrap();

        module.defer_updates();
        module.update_sound_params(a, 100, 64);
        module.update_sound_params(b, 50, 128);
        module.update_sound_params(a, 90, 70);
        assert_eq!(module.pending_updates(), 2);

        module.process_updates();
        assert_eq!(module.pending_updates(), 0);
        assert_eq!(module.core.gains[a.index()].get(), stereo_gains(90, 70));

        // 非批量模式直接生效
        module.update_sound_params(b, 127, 0);
        assert_eq!(module.pending_updates(), 0);
        assert_eq!(module.core.gains[b.index()].get(), stereo_gains(127, 0));
    }

    #[test]
    fn test_positional_stop_drops_queued_update() {
        let mut module = PositionalSoundModule::default();
        let channel = ChannelId::new(3).unwrap();
        module.defer_updates();
        module.update_sound_params(channel, 100, 64);
        module.stop_sound(channel);
        assert_eq!(module.pending_updates(), 0);
        module.shutdown_module();
    }
}
