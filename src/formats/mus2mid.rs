//! MUS → MIDI 转换
//!
//! 把 DMX 的 MUS 乐谱转换为单轨（format 0）标准 MIDI 文件，供只认识 SMF 的
//! 原生音序器播放。
//!
//! ## 时间基准
//!
//! MUS 以 140Hz 计时。输出文件的分辨率为每四分音符 70 tick，且不写入速度事件，
//! 因此默认速度（500000 µs/四分音符）下刚好是每秒 140 tick，延迟值可以原样搬运。
//!
//! ## 通道映射
//!
//! MUS 通道 15 是打击乐，固定映射到 MIDI 通道 9；其余通道按首次使用的顺序分配，
//! 跳过 9。通道首次分配时先发送一次 "all notes off"。

use crate::core::error::{FormatError, FormatResult};
use crate::formats::looks_like_mus;

/// MUS 头长度（id + 5 个 u16）
const MUS_HEADER_LEN: usize = 14;

/// 输出文件的分辨率（tick/四分音符）
const MIDI_DIVISION: u16 = 70;

const MUS_PERCUSSION_CHAN: usize = 15;
const MIDI_PERCUSSION_CHAN: u8 = 9;

/// MUS 控制器编号到 MIDI 控制器编号（索引 0 为音色切换，单独处理）
const CONTROLLER_MAP: [u8; 15] = [
    0x00, 0x00, 0x01, 0x07, 0x0A, 0x0B, 0x5B, 0x5D, 0x40, 0x43, 0x78, 0x7B, 0x7E, 0x7F, 0x79,
];

const MIDI_ALL_NOTES_OFF: u8 = 0x7B;

/// MUS 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MusEvent {
    ReleaseKey,
    PressKey,
    PitchWheel,
    SystemEvent,
    ChangeController,
    MeasureEnd,
    ScoreEnd,
    Unused,
}

impl MusEvent {
    fn from_descriptor(descriptor: u8) -> Self {
        match (descriptor >> 4) & 0x07 {
            0 => MusEvent::ReleaseKey,
            1 => MusEvent::PressKey,
            2 => MusEvent::PitchWheel,
            3 => MusEvent::SystemEvent,
            4 => MusEvent::ChangeController,
            5 => MusEvent::MeasureEnd,
            6 => MusEvent::ScoreEnd,
            _ => MusEvent::Unused,
        }
    }
}

/// MUS 文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusHeader {
    pub score_length: u16,
    pub score_start: u16,
    pub primary_channels: u16,
    pub secondary_channels: u16,
    pub instrument_count: u16,
}

impl MusHeader {
    /// 解析 MUS 文件头
    pub fn parse(data: &[u8]) -> FormatResult<Self> {
        if !looks_like_mus(data) {
            return Err(FormatError::BadHeader("missing MUS signature".into()));
        }
        if data.len() < MUS_HEADER_LEN {
            return Err(FormatError::Truncated(data.len()));
        }

        let word = |offset: usize| u16::from_le_bytes([data[offset], data[offset + 1]]);
        let header = Self {
            score_length: word(4),
            score_start: word(6),
            primary_channels: word(8),
            secondary_channels: word(10),
            instrument_count: word(12),
        };

        if usize::from(header.score_start) > data.len() {
            return Err(FormatError::BadHeader(format!(
                "score start {} beyond end of data ({})",
                header.score_start,
                data.len()
            )));
        }

        Ok(header)
    }
}

/// 顺序读取 MUS 字节
struct MusReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MusReader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn read_u8(&mut self) -> FormatResult<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(FormatError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    /// 读取 MUS 可变长度延迟
    fn read_delay(&mut self) -> FormatResult<u32> {
        let mut delay: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            delay = delay.wrapping_mul(128).wrapping_add(u32::from(byte & 0x7F));
            if byte & 0x80 == 0 {
                return Ok(delay);
            }
        }
    }
}

/// MIDI 轨道写入器
///
/// 每个事件前写入累计的等待时间，然后清零。
struct TrackWriter {
    bytes: Vec<u8>,
    queued_time: u32,
}

impl TrackWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            queued_time: 0,
        }
    }

    fn write_time(&mut self) {
        write_varlen(&mut self.bytes, self.queued_time);
        self.queued_time = 0;
    }

    fn write_event(&mut self, status: u8, data: &[u8]) {
        self.write_time();
        self.bytes.push(status);
        self.bytes.extend_from_slice(data);
    }

    fn release_key(&mut self, channel: u8, key: u8) {
        self.write_event(0x80 | channel, &[key & 0x7F, 0]);
    }

    fn press_key(&mut self, channel: u8, key: u8, velocity: u8) {
        self.write_event(0x90 | channel, &[key & 0x7F, velocity & 0x7F]);
    }

    fn pitch_wheel(&mut self, channel: u8, wheel: u16) {
        self.write_event(
            0xE0 | channel,
            &[(wheel & 0x7F) as u8, ((wheel >> 7) & 0x7F) as u8],
        );
    }

    fn change_patch(&mut self, channel: u8, patch: u8) {
        self.write_event(0xC0 | channel, &[patch & 0x7F]);
    }

    fn change_controller(&mut self, channel: u8, controller: u8, value: u8) {
        // 超出 7 位的值钳制到 127
        let value = value.min(0x7F);
        self.write_event(0xB0 | channel, &[controller & 0x7F, value]);
    }

    fn end_of_track(&mut self) {
        self.write_event(0xFF, &[0x2F, 0x00]);
    }
}

/// 写入 MIDI 可变长度整数
pub(crate) fn write_varlen(out: &mut Vec<u8>, value: u32) {
    let mut buffer = value & 0x7F;
    let mut rest = value >> 7;
    while rest != 0 {
        buffer <<= 8;
        buffer |= (rest & 0x7F) | 0x80;
        rest >>= 7;
    }
    loop {
        out.push((buffer & 0xFF) as u8);
        if buffer & 0x80 != 0 {
            buffer >>= 8;
        } else {
            break;
        }
    }
}

/// 读取 MIDI 可变长度整数，返回 (值, 消耗字节数)
///
/// 最多 4 个字节；数据在结束标记前耗尽时返回 `None`。
pub(crate) fn read_varlen(data: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (index, &byte) in data.iter().take(4).enumerate() {
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Some((value, index + 1));
        }
    }
    None
}

/// MUS 通道到 MIDI 通道的分配表
struct ChannelMap {
    map: [Option<u8>; 16],
}

impl ChannelMap {
    fn new() -> Self {
        Self { map: [None; 16] }
    }

    /// 返回 (MIDI 通道, 是否首次分配)
    fn get(&mut self, mus_channel: usize) -> (u8, bool) {
        if mus_channel == MUS_PERCUSSION_CHAN {
            return (MIDI_PERCUSSION_CHAN, false);
        }
        if let Some(channel) = self.map[mus_channel] {
            return (channel, false);
        }

        let mut next = self
            .map
            .iter()
            .flatten()
            .max()
            .map_or(0, |max| max + 1);
        if next == MIDI_PERCUSSION_CHAN {
            next += 1;
        }
        self.map[mus_channel] = Some(next);
        (next, true)
    }
}

/// 把 MUS 数据转换为标准 MIDI 文件
///
/// 乐谱在 score-end 事件或数据结尾处结束；事件中途截断视为错误。
pub fn mus2mid(data: &[u8]) -> FormatResult<Vec<u8>> {
    let header = MusHeader::parse(data)?;

    let mut reader = MusReader::new(data, usize::from(header.score_start));
    let mut track = TrackWriter::new();
    let mut channels = ChannelMap::new();
    let mut velocities = [127u8; 16];

    while reader.pos < data.len() {
        let descriptor = reader.read_u8()?;
        let mus_channel = usize::from(descriptor & 0x0F);
        let event = MusEvent::from_descriptor(descriptor);

        if event == MusEvent::ScoreEnd {
            break;
        }

        let (channel, first_use) = channels.get(mus_channel);
        if first_use {
            track.change_controller(channel, MIDI_ALL_NOTES_OFF, 0);
        }

        match event {
            MusEvent::ReleaseKey => {
                let key = reader.read_u8()?;
                track.release_key(channel, key);
            }
            MusEvent::PressKey => {
                let key = reader.read_u8()?;
                if key & 0x80 != 0 {
                    velocities[mus_channel] = reader.read_u8()?.min(0x7F);
                }
                track.press_key(channel, key, velocities[mus_channel]);
            }
            MusEvent::PitchWheel => {
                let bend = reader.read_u8()?;
                track.pitch_wheel(channel, u16::from(bend) * 64);
            }
            MusEvent::SystemEvent => {
                let controller = reader.read_u8()?;
                if !(10..=14).contains(&controller) {
                    return Err(FormatError::Unsupported(format!(
                        "system event {} at offset {}",
                        controller, reader.pos
                    )));
                }
                track.change_controller(channel, CONTROLLER_MAP[usize::from(controller)], 0);
            }
            MusEvent::ChangeController => {
                let controller = reader.read_u8()?;
                let value = reader.read_u8()?;
                match controller {
                    0 => track.change_patch(channel, value),
                    1..=9 => track.change_controller(
                        channel,
                        CONTROLLER_MAP[usize::from(controller)],
                        value,
                    ),
                    _ => {
                        return Err(FormatError::Unsupported(format!(
                            "controller {} at offset {}",
                            controller, reader.pos
                        )))
                    }
                }
            }
            MusEvent::MeasureEnd | MusEvent::Unused | MusEvent::ScoreEnd => {
                return Err(FormatError::Unsupported(format!(
                    "event type {:?} at offset {}",
                    event, reader.pos
                )));
            }
        }

        if descriptor & 0x80 != 0 {
            let delay = reader.read_delay()?;
            track.queued_time = track.queued_time.wrapping_add(delay);
        }
    }

    track.end_of_track();

    let track_len = u32::try_from(track.bytes.len())
        .map_err(|_| FormatError::Unsupported("track too long".into()))?;

    let mut out = Vec::with_capacity(22 + track.bytes.len());
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // format 0
    out.extend_from_slice(&1u16.to_be_bytes()); // 单轨
    out.extend_from_slice(&MIDI_DIVISION.to_be_bytes());
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&track_len.to_be_bytes());
    out.extend_from_slice(&track.bytes);

    Ok(out)
}
