//! 音效通道池
//!
//! 固定 [`MAX_CHANNELS`] 个槽位。槽位只记录"是否被占用、播放的是哪个音效、播放实例 ID"，
//! 真正的音频输出由当前声音模块负责。

use super::sfx::SfxId;
use crate::config::{MAX_PITCH_BEND_RANGE, MIN_PITCH_BEND_RANGE};
use crate::core::error::{SoundError, SoundResult};
use std::convert::TryFrom;
use std::fmt;

/// 同时播放的音效通道数
pub const MAX_CHANNELS: usize = 32;

/// 不变调时的音高值，也是步进表的中点
pub const NORM_PITCH: i32 = 128;

/// 居中的立体声分离度
pub const NORM_SEP: i32 = 128;

/// 步进表长度
pub const STEP_TABLE_LEN: usize = 256;

/// 通道句柄
///
/// 只能通过带检查的构造函数创建，持有它即意味着下标有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(usize);

impl ChannelId {
    /// 创建通道句柄，越界返回 `SoundError::ChannelOutOfRange`
    pub fn new(index: usize) -> SoundResult<Self> {
        if index < MAX_CHANNELS {
            Ok(Self(index))
        } else {
            Err(SoundError::ChannelOutOfRange(index))
        }
    }

    /// 槽位下标
    pub fn index(self) -> usize {
        self.0
    }

    /// 按下标顺序遍历所有通道
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (0..MAX_CHANNELS).map(ChannelId)
    }
}

impl TryFrom<usize> for ChannelId {
    type Error = SoundError;

    fn try_from(index: usize) -> SoundResult<Self> {
        Self::new(index)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.0)
    }
}

/// 单个通道槽位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSlot {
    /// 正在播放的音效，用于识别重复音效（比如电锯）
    pub sfx: Option<SfxId>,
    /// 槽位是否被占用
    pub enabled: bool,
    /// 播放实例 ID，0 表示自重置以来从未被占用
    pub id: u64,
}

/// 通道池
#[derive(Debug, Clone)]
pub struct ChannelPool {
    slots: [ChannelSlot; MAX_CHANNELS],
    next_id: u64,
}

impl Default for ChannelPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPool {
    /// 创建空通道池
    pub fn new() -> Self {
        Self {
            slots: [ChannelSlot::default(); MAX_CHANNELS],
            next_id: 1,
        }
    }

    /// 按下标顺序找到第一个空闲槽位
    pub fn find_free(&self) -> Option<ChannelId> {
        self.slots
            .iter()
            .position(|slot| !slot.enabled)
            .map(ChannelId)
    }

    /// 占用槽位并分配新的播放实例 ID
    pub fn occupy(&mut self, channel: ChannelId, sfx: SfxId) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.slots[channel.0] = ChannelSlot {
            sfx: Some(sfx),
            enabled: true,
            id,
        };
        id
    }

    /// 释放槽位，返回释放前是否被占用
    ///
    /// 实例 ID 保留，调用方仍可据此判断旧声音是否被替换。
    pub fn release(&mut self, channel: ChannelId) -> bool {
        let slot = &mut self.slots[channel.0];
        let was_enabled = slot.enabled;
        slot.enabled = false;
        was_enabled
    }

    /// 清空全部槽位，ID 计数器不重置
    pub fn reset(&mut self) {
        self.slots = [ChannelSlot::default(); MAX_CHANNELS];
    }

    /// 读取槽位
    pub fn slot(&self, channel: ChannelId) -> &ChannelSlot {
        &self.slots[channel.0]
    }

    /// 槽位是否被占用
    pub fn is_enabled(&self, channel: ChannelId) -> bool {
        self.slots[channel.0].enabled
    }

    /// 被占用的槽位数
    pub fn enabled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.enabled).count()
    }

    /// 遍历被占用的通道
    pub fn enabled_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.enabled)
            .map(|(index, _)| ChannelId(index))
    }
}

/// 音高 → 播放速度步进表
#[derive(Debug, Clone)]
pub struct StepTable {
    steps: [f32; STEP_TABLE_LEN],
}

impl Default for StepTable {
    fn default() -> Self {
        Self::new(200)
    }
}

impl StepTable {
    /// 以百分比弯音范围生成步进表
    ///
    /// `step[i] = base^((2 * (i - 128)) / 128)`，`base = pitch_bend_range / 100`。
    /// 范围先钳制到 100 - 300。
    pub fn new(pitch_bend_range: i32) -> Self {
        let range = pitch_bend_range.clamp(MIN_PITCH_BEND_RANGE, MAX_PITCH_BEND_RANGE);
        let base = f64::from(range) / 100.0;
        let mut steps = [0.0f32; STEP_TABLE_LEN];
        for (i, step) in steps.iter_mut().enumerate() {
            let exponent = f64::from(2 * (i as i32 - NORM_PITCH)) / f64::from(NORM_PITCH);
            *step = base.powf(exponent) as f32;
        }
        Self { steps }
    }

    /// 取音高对应的步进，越界音高钳制到表内
    pub fn step(&self, pitch: i32) -> f32 {
        let index = pitch.clamp(0, STEP_TABLE_LEN as i32 - 1) as usize;
        self.steps[index]
    }

    /// 原始表
    pub fn as_slice(&self) -> &[f32] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_channel_id_bounds() {
        assert!(ChannelId::new(0).is_ok());
        assert!(ChannelId::new(MAX_CHANNELS - 1).is_ok());
        assert_eq!(
            ChannelId::new(MAX_CHANNELS),
            Err(SoundError::ChannelOutOfRange(MAX_CHANNELS))
        );
        assert!(ChannelId::try_from(usize::MAX).is_err());
    }

    #[test]
    fn test_first_free_in_index_order() {
        let mut pool = ChannelPool::new();
        let first = pool.find_free().unwrap();
        assert_eq!(first.index(), 0);
        pool.occupy(first, SfxId(1));

        let second = pool.find_free().unwrap();
        assert_eq!(second.index(), 1);
        pool.occupy(second, SfxId(1));

        pool.release(first);
        assert_eq!(pool.find_free().unwrap().index(), 0);
    }

    #[test]
    fn test_ids_start_at_one_and_survive_reset() {
        let mut pool = ChannelPool::new();
        let channel = pool.find_free().unwrap();
        assert_eq!(pool.slot(channel).id, 0);
        assert_eq!(pool.occupy(channel, SfxId(3)), 1);

        pool.reset();
        assert_eq!(pool.slot(channel).id, 0);
        assert!(!pool.is_enabled(channel));
        assert_eq!(pool.occupy(channel, SfxId(3)), 2);
    }

    #[test]
    fn test_full_pool_has_no_free_slot() {
        let mut pool = ChannelPool::new();
        for channel in ChannelId::all() {
            pool.occupy(channel, SfxId(1));
        }
        assert_eq!(pool.enabled_count(), MAX_CHANNELS);
        assert!(pool.find_free().is_none());
    }

    #[test]
    fn test_release_reports_previous_state() {
        let mut pool = ChannelPool::new();
        let channel = ChannelId::new(5).unwrap();
        assert!(!pool.release(channel));
        pool.occupy(channel, SfxId(2));
        assert!(pool.release(channel));
        assert_eq!(pool.slot(channel).id, 1);
    }

    #[test]
    fn test_step_table_default_center() {
        let table = StepTable::default();
        assert_eq!(table.step(NORM_PITCH), 1.0);
        assert!((table.step(0) - 0.25).abs() < 1e-6);
        assert!((table.step(255) - 2.0f32.powf(254.0 / 128.0)).abs() < 1e-4);
    }

    #[test]
    fn test_step_table_clamps_pitch() {
        let table = StepTable::default();
        assert_eq!(table.step(-40), table.step(0));
        assert_eq!(table.step(1000), table.step(255));
    }

    #[test]
    fn test_step_table_out_of_range_bend_stays_finite() {
        for range in [-50, 0, 99, 301, i32::MAX] {
            let table = StepTable::new(range);
            assert!(table.as_slice().iter().all(|s| s.is_finite() && *s > 0.0));
        }
        assert_eq!(StepTable::new(0).as_slice(), StepTable::new(100).as_slice());
        assert_eq!(StepTable::new(1000).as_slice(), StepTable::new(300).as_slice());
    }

    #[derive(Debug, Clone)]
    enum PoolOp {
        Start(u16),
        Stop(usize),
    }

    fn pool_op() -> impl Strategy<Value = PoolOp> {
        prop_oneof![
            (1u16..100).prop_map(PoolOp::Start),
            (0..MAX_CHANNELS).prop_map(PoolOp::Stop),
        ]
    }

    proptest! {
        #[test]
        fn pool_never_exceeds_capacity_and_ids_increase(ops in prop::collection::vec(pool_op(), 0..200)) {
            let mut pool = ChannelPool::new();
            let mut last_id = 0u64;

            for op in ops {
                match op {
                    PoolOp::Start(sfx) => match pool.find_free() {
                        Some(channel) => {
                            let id = pool.occupy(channel, SfxId(sfx as usize));
                            prop_assert!(id > last_id);
                            last_id = id;
                        }
                        None => prop_assert_eq!(pool.enabled_count(), MAX_CHANNELS),
                    },
                    PoolOp::Stop(index) => {
                        let channel = ChannelId::new(index).unwrap();
                        pool.release(channel);
                        prop_assert!(!pool.is_enabled(channel));
                    }
                }
                prop_assert!(pool.enabled_count() <= MAX_CHANNELS);
            }
        }

        #[test]
        fn step_table_is_symmetric(range in 100i32..=300, k in 0i32..128) {
            let table = StepTable::new(range);
            let product = table.step(NORM_PITCH + k) * table.step(NORM_PITCH - k);
            prop_assert!((product - 1.0).abs() < 1e-4);
        }

        #[test]
        fn step_table_is_monotonic(range in 101i32..=300) {
            let table = StepTable::new(range);
            for pair in table.as_slice().windows(2) {
                prop_assert!(pair[1] > pair[0]);
            }
        }
    }
}
