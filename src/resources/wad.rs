//! WAD 文件目录解析
//!
//! 文件头 12 字节：`IWAD`/`PWAD` 标记、lump 数量、目录偏移（均为小端 i32）。
//! 目录项 16 字节：数据偏移、数据长度、8 字节名字（不足以 0 填充）。

use super::LumpSource;
use crate::core::error::{FormatError, FormatResult};
use std::fs;
use std::path::Path;

const HEADER_LEN: usize = 12;
const DIRECTORY_ENTRY_LEN: usize = 16;

/// lump 名字最大长度
pub const LUMP_NAME_LEN: usize = 8;

/// WAD 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WadKind {
    /// 主数据文件
    Iwad,
    /// 补丁文件
    Pwad,
}

impl WadKind {
    fn magic(self) -> &'static [u8; 4] {
        match self {
            WadKind::Iwad => b"IWAD",
            WadKind::Pwad => b"PWAD",
        }
    }
}

#[derive(Debug, Clone)]
struct LumpEntry {
    name: String,
    offset: usize,
    size: usize,
}

/// 已加载到内存的 WAD 文件
#[derive(Debug, Clone)]
pub struct WadFile {
    kind: WadKind,
    data: Vec<u8>,
    lumps: Vec<LumpEntry>,
}

/// 规范化 lump 名字：截断到 8 个字符并转为大写
fn normalize_name(name: &str) -> String {
    name.chars()
        .take(LUMP_NAME_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn read_i32(data: &[u8], offset: usize) -> FormatResult<i32> {
    data.get(offset..offset + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(FormatError::Truncated(offset))
}

fn read_usize(data: &[u8], offset: usize, what: &str) -> FormatResult<usize> {
    let value = read_i32(data, offset)?;
    usize::try_from(value).map_err(|_| FormatError::BadHeader(format!("negative {}: {}", what, value)))
}

impl WadFile {
    /// 读取并解析磁盘上的 WAD
    pub fn open<P: AsRef<Path>>(path: P) -> FormatResult<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| FormatError::Unsupported(format!("{}: {}", path.display(), e)))?;
        let wad = Self::parse(data)?;
        tracing::info!(
            target: "wad",
            "Loaded {:?} {} with {} lumps",
            wad.kind,
            path.display(),
            wad.lumps.len()
        );
        Ok(wad)
    }

    /// 解析内存中的 WAD 数据
    pub fn parse(data: Vec<u8>) -> FormatResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(FormatError::Truncated(data.len()));
        }

        let kind = match &data[0..4] {
            b"IWAD" => WadKind::Iwad,
            b"PWAD" => WadKind::Pwad,
            other => {
                return Err(FormatError::BadHeader(format!(
                    "unknown WAD magic {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        let num_lumps = read_usize(&data, 4, "lump count")?;
        let directory = read_usize(&data, 8, "directory offset")?;

        let directory_end = num_lumps
            .checked_mul(DIRECTORY_ENTRY_LEN)
            .and_then(|len| len.checked_add(directory))
            .ok_or_else(|| FormatError::BadHeader("directory size overflow".into()))?;
        if directory_end > data.len() {
            return Err(FormatError::Truncated(data.len()));
        }

        let mut lumps = Vec::with_capacity(num_lumps);
        for index in 0..num_lumps {
            let entry = directory + index * DIRECTORY_ENTRY_LEN;
            let offset = read_usize(&data, entry, "lump offset")?;
            let size = read_usize(&data, entry + 4, "lump size")?;

            let raw_name = &data[entry + 8..entry + DIRECTORY_ENTRY_LEN];
            let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(LUMP_NAME_LEN);
            let name = normalize_name(&String::from_utf8_lossy(&raw_name[..name_len]));

            if offset.checked_add(size).map_or(true, |end| end > data.len()) {
                return Err(FormatError::BadHeader(format!(
                    "lump {} ({}) extends past end of file",
                    index, name
                )));
            }

            lumps.push(LumpEntry { name, offset, size });
        }

        Ok(Self { kind, data, lumps })
    }

    /// 由命名数据块构建 WAD（lump 顺序保持不变）
    pub fn from_lumps<I, S>(kind: WadKind, lumps: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let mut data = Vec::new();
        let mut entries = Vec::new();
        for (name, bytes) in lumps {
            entries.push(LumpEntry {
                name: normalize_name(name.as_ref()),
                offset: HEADER_LEN + data.len(),
                size: bytes.len(),
            });
            data.extend_from_slice(&bytes);
        }

        let mut wad = Self {
            kind,
            data: Vec::new(),
            lumps: entries,
        };
        let mut bytes = wad.header_bytes(HEADER_LEN + data.len());
        bytes.extend_from_slice(&data);
        bytes.extend_from_slice(&wad.directory_bytes());
        wad.data = bytes;
        wad
    }

    fn header_bytes(&self, directory: usize) -> Vec<u8> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(self.kind.magic());
        header.extend_from_slice(&(self.lumps.len() as i32).to_le_bytes());
        header.extend_from_slice(&(directory as i32).to_le_bytes());
        header
    }

    fn directory_bytes(&self) -> Vec<u8> {
        let mut directory = Vec::with_capacity(self.lumps.len() * DIRECTORY_ENTRY_LEN);
        for lump in &self.lumps {
            directory.extend_from_slice(&(lump.offset as i32).to_le_bytes());
            directory.extend_from_slice(&(lump.size as i32).to_le_bytes());
            let mut name = [0u8; LUMP_NAME_LEN];
            for (slot, byte) in name.iter_mut().zip(lump.name.bytes()) {
                *slot = byte;
            }
            directory.extend_from_slice(&name);
        }
        directory
    }

    /// 完整的文件字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// WAD 类型
    pub fn kind(&self) -> WadKind {
        self.kind
    }

    /// lump 名字
    pub fn lump_name(&self, lump: usize) -> Option<&str> {
        self.lumps.get(lump).map(|entry| entry.name.as_str())
    }
}

impl LumpSource for WadFile {
    fn check_num_for_name(&self, name: &str) -> Option<usize> {
        let wanted = normalize_name(name);
        self.lumps.iter().rposition(|entry| entry.name == wanted)
    }

    fn lump_data(&self, lump: usize) -> Option<&[u8]> {
        self.lumps
            .get(lump)
            .map(|entry| &self.data[entry.offset..entry.offset + entry.size])
    }

    fn num_lumps(&self) -> usize {
        self.lumps.len()
    }
}
