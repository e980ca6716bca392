//! 后端模块接口
//!
//! 音效和音乐各有一组可互换的后端。后端的初始化失败只意味着"这个后端不可用"，
//! 由调度方记录日志并降级；所有原生 API 错误都在后端内部消化。

use super::channel::ChannelId;
use super::sfx::SfxInfo;
use crate::core::error::BackendResult;
use crate::resources::LumpSource;
use glam::Vec3;

/// 声源或听者的空间状态
///
/// 坐标沿用地图单位：x/y 为水平面，z 向上；`angle` 为绕 z 轴的朝向（弧度）。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoundOrigin {
    pub position: Vec3,
    pub angle: f32,
}

impl SoundOrigin {
    pub fn new(position: Vec3, angle: f32) -> Self {
        Self { position, angle }
    }

    /// 水平朝向单位向量
    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.angle.cos(), self.angle.sin(), 0.0)
    }
}

/// 后端根据空间关系调整后的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustedParams {
    /// 音量 (0 - 127)
    pub volume: i32,
    /// 立体声分离度 (0 - 255，128 居中)
    pub separation: i32,
    /// 叠加到音效优先级上的偏移，越小越重要
    pub priority: i32,
}

/// 音高值与对应的播放速度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchStep {
    /// 原始音高 (0 - 255)
    pub pitch: i32,
    /// 步进表中的速度倍率
    pub step: f32,
}

/// 已注册歌曲的句柄，只在发出它的模块内有效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SongHandle(pub u64);

/// 音效后端
pub trait SoundModule {
    /// 模块名（日志用）
    fn name(&self) -> &str;

    /// 首次初始化
    fn init_sound(&mut self) -> BackendResult<()>;

    /// 切换到本模块时重新初始化
    fn reinit_sound(&mut self) -> BackendResult<()>;

    /// 是否允许运行时重新初始化
    fn allow_reinit_sound(&self) -> bool;

    /// 听者参数更新，只有定位类后端需要
    fn update_listener_params(&mut self, _listener: &SoundOrigin) {}

    /// 确保音效数据已加载
    fn cache_sound(&mut self, sfx: &mut SfxInfo, lumps: &dyn LumpSource) -> bool;

    /// 计算声源相对听者的音量/分离度/优先级，`None` 表示听不到
    fn adjust_sound_params(
        &self,
        listener: &SoundOrigin,
        source: &SoundOrigin,
        chanvol: i32,
    ) -> Option<AdjustedParams>;

    /// 更新通道音量与分离度
    fn update_sound_params(&mut self, channel: ChannelId, volume: i32, separation: i32);

    /// 在通道上开始播放
    fn start_sound(&mut self, channel: ChannelId, sfx: &SfxInfo, pitch: PitchStep) -> bool;

    /// 停止通道
    fn stop_sound(&mut self, channel: ChannelId);

    /// 通道是否仍在发声
    fn sound_is_playing(&self, channel: ChannelId) -> bool;

    /// 关闭整个声音输出
    fn shutdown_sound(&mut self);

    /// 切换模块前释放本模块资源
    fn shutdown_module(&mut self);

    /// 开始批量更新
    fn defer_updates(&mut self) {}

    /// 提交批量更新
    fn process_updates(&mut self) {}
}

/// 音乐后端
pub trait MusicModule {
    /// 模块名（日志用）
    fn name(&self) -> &str;

    /// 在指定本地设备上初始化
    fn init_music(&mut self, device: usize) -> BackendResult<()>;

    /// 关闭，可重复调用
    fn shutdown_music(&mut self);

    /// 音量 (0 - 15)，未初始化时忽略
    fn set_music_volume(&mut self, volume: i32);

    fn pause_song(&mut self, handle: SongHandle);

    fn resume_song(&mut self, handle: SongHandle);

    /// 注册歌曲数据
    fn register_song(&mut self, data: &[u8]) -> BackendResult<SongHandle>;

    fn play_song(&mut self, handle: SongHandle, looping: bool);

    /// 每个游戏 tick 轮询一次
    fn update_music(&mut self) {}

    fn stop_song(&mut self, handle: SongHandle);

    fn unregister_song(&mut self, handle: SongHandle);

    /// 设备名列表与当前选中的本地下标
    fn device_list(&self) -> (Vec<String>, usize);

    /// 与流式模块共用输出时必须在播放非 MIDI 歌曲前关闭
    fn conflicts_with_streaming(&self) -> bool {
        false
    }
}
