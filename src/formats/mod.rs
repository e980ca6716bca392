//! 字节格式模块
//!
//! - 歌曲签名探测（MIDI / MUS）
//! - `mus2mid` - MUS → 标准 MIDI 文件转换
//! - `dmx` - DMX 音效 lump 解码
//! - `smf` - 标准 MIDI 文件的时间结构扫描

pub mod dmx;
pub mod mus2mid;
pub mod smf;

pub use dmx::{decode_dmx, DmxSound};
pub use mus2mid::mus2mid;
pub use smf::{parse_smf, SmfInfo};

/// 标准 MIDI 文件头
pub const MIDI_SIGNATURE: &[u8; 4] = b"MThd";

/// MUS 文件头
pub const MUS_SIGNATURE: &[u8; 4] = b"MUS\x1a";

/// 数据是否以标准 MIDI 头开始
///
/// 长度必须严格大于签名长度，只有签名的缓冲区不算有效歌曲。
pub fn looks_like_midi(data: &[u8]) -> bool {
    data.len() > MIDI_SIGNATURE.len() && data.starts_with(MIDI_SIGNATURE)
}

/// 数据是否以 MUS 头开始
pub fn looks_like_mus(data: &[u8]) -> bool {
    data.len() > MUS_SIGNATURE.len() && data.starts_with(MUS_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures() {
        assert!(looks_like_midi(b"MThd\x00\x00\x00\x06"));
        assert!(looks_like_mus(b"MUS\x1a\x10\x00"));
        assert!(!looks_like_midi(b"MUS\x1a\x10\x00"));
        assert!(!looks_like_mus(b"OggS\x00\x02"));
    }

    #[test]
    fn test_signature_alone_is_too_short() {
        assert!(!looks_like_midi(b"MThd"));
        assert!(!looks_like_mus(b"MUS\x1a"));
        assert!(!looks_like_midi(b""));
    }
}
