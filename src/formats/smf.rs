//! 标准 MIDI 文件的结构扫描
//!
//! 只提取时间相关信息：分辨率、每条音轨的总 tick 数、首个速度事件。
//! 不解析音符本身。

use super::mus2mid::read_varlen;
use crate::core::error::{FormatError, FormatResult};

/// 默认速度：每四分音符 500000 微秒（120 BPM）
pub const DEFAULT_TEMPO: u32 = 500_000;

/// 扫描结果
#[derive(Debug, Clone, PartialEq)]
pub struct SmfInfo {
    /// 文件格式 (0/1/2)
    pub format: u16,
    /// 每四分音符的 tick 数
    pub division: u16,
    /// 每条音轨的长度（tick）
    pub track_ticks: Vec<u64>,
    /// 每四分音符的微秒数
    pub tempo: u32,
}

impl SmfInfo {
    /// 各音轨长度（以拍为单位）
    pub fn track_beats(&self) -> Vec<f64> {
        let division = f64::from(self.division.max(1));
        self.track_ticks
            .iter()
            .map(|&ticks| ticks as f64 / division)
            .collect()
    }

    /// 每秒拍数
    pub fn beats_per_second(&self) -> f64 {
        1_000_000.0 / f64::from(self.tempo.max(1))
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> FormatResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(FormatError::Truncated(self.pos))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self) -> FormatResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> FormatResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> FormatResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn varlen(&mut self) -> FormatResult<u32> {
        let (value, used) =
            read_varlen(&self.data[self.pos..]).ok_or(FormatError::Truncated(self.pos))?;
        self.pos += used;
        Ok(value)
    }
}

/// 扫描标准 MIDI 文件
pub fn parse_smf(data: &[u8]) -> FormatResult<SmfInfo> {
    let mut cursor = Cursor { data, pos: 0 };

    if cursor.take(4)? != b"MThd" {
        return Err(FormatError::BadHeader("missing MThd chunk".into()));
    }
    let header_len = cursor.u32()? as usize;
    if header_len < 6 {
        return Err(FormatError::BadHeader(format!("header length {}", header_len)));
    }
    let format = cursor.u16()?;
    let num_tracks = cursor.u16()?;
    let division = cursor.u16()?;
    cursor.take(header_len - 6)?;

    if division & 0x8000 != 0 {
        return Err(FormatError::Unsupported("SMPTE time division".into()));
    }

    let mut tempo = None;
    let mut track_ticks = Vec::with_capacity(num_tracks as usize);

    while track_ticks.len() < num_tracks as usize {
        let id = cursor.take(4)?;
        let len = cursor.u32()? as usize;
        let chunk = cursor.take(len)?;
        if id != b"MTrk" {
            continue;
        }
        let (ticks, track_tempo) = scan_track(chunk)?;
        if tempo.is_none() {
            tempo = track_tempo;
        }
        track_ticks.push(ticks);
    }

    Ok(SmfInfo {
        format,
        division,
        track_ticks,
        tempo: tempo.unwrap_or(DEFAULT_TEMPO),
    })
}

fn scan_track(chunk: &[u8]) -> FormatResult<(u64, Option<u32>)> {
    let mut cursor = Cursor { data: chunk, pos: 0 };
    let mut ticks = 0u64;
    let mut tempo = None;
    let mut running_status = None;

    while cursor.pos < chunk.len() {
        ticks += u64::from(cursor.varlen()?);

        let mut status = cursor.byte()?;
        if status < 0x80 {
            // 运行状态：刚读到的字节其实是第一个数据字节
            status = running_status.ok_or(FormatError::BadHeader("data byte without status".into()))?;
            cursor.pos -= 1;
        }

        match status {
            0xFF => {
                let kind = cursor.byte()?;
                let len = cursor.varlen()? as usize;
                let payload = cursor.take(len)?;
                match kind {
                    0x2F => break,
                    0x51 if len == 3 && tempo.is_none() => {
                        tempo = Some(u32::from_be_bytes([0, payload[0], payload[1], payload[2]]));
                    }
                    _ => {}
                }
            }
            0xF0 | 0xF7 => {
                let len = cursor.varlen()? as usize;
                cursor.take(len)?;
            }
            _ => {
                running_status = Some(status);
                let data_len = match status & 0xF0 {
                    0xC0 | 0xD0 => 1,
                    _ => 2,
                };
                cursor.take(data_len)?;
            }
        }
    }

    Ok((ticks, tempo))
}
