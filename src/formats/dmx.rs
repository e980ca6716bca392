//! DMX 音效 lump 解码
//!
//! 布局：`03 00` 格式标记、u16 采样率、u32 采样数（均为小端），随后是 8 位无符号 PCM。
//! DMX 在数据两端各有 16 字节填充，播放时需要跳过。

use crate::core::error::{FormatError, FormatResult};

const DMX_HEADER_LEN: usize = 8;
const DMX_PADDING: usize = 16;

/// 低于该长度的音效会被 DMX 丢弃
const DMX_MIN_LENGTH: usize = 48;

/// 解码后的单声道音效
#[derive(Debug, Clone, PartialEq)]
pub struct DmxSound {
    /// 采样率（Hz）
    pub sample_rate: u32,
    /// 单声道样本 (-1.0 - 1.0)
    pub samples: Vec<f32>,
}

impl DmxSound {
    /// 时长（秒）
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// 数据是否带有 DMX 格式标记
pub fn is_dmx(data: &[u8]) -> bool {
    data.len() > DMX_HEADER_LEN && data[0] == 0x03 && data[1] == 0x00
}

/// 解码 DMX 音效 lump
pub fn decode_dmx(data: &[u8]) -> FormatResult<DmxSound> {
    if !is_dmx(data) {
        return Err(FormatError::BadHeader("not a DMX sound lump".into()));
    }

    let sample_rate = u32::from(u16::from_le_bytes([data[2], data[3]]));
    let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;

    if sample_rate == 0 {
        return Err(FormatError::BadHeader("sample rate is 0".into()));
    }

    if length > data.len() - DMX_HEADER_LEN || length <= DMX_MIN_LENGTH {
        return Err(FormatError::BadHeader(format!(
            "declared length {} invalid for lump of {} bytes",
            length,
            data.len()
        )));
    }

    let start = DMX_HEADER_LEN + DMX_PADDING;
    let end = DMX_HEADER_LEN + length - DMX_PADDING;

    let samples = data[start..end]
        .iter()
        .map(|&byte| (f32::from(byte) - 128.0) / 128.0)
        .collect();

    Ok(DmxSound {
        sample_rate,
        samples,
    })
}
