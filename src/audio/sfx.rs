//! 音效描述表
//!
//! 音效表由游戏一侧拥有，声音子系统只读写其中的 lump 缓存与替换链接。
//! 下标 0 保留为"无音效"条目。

use super::channel::NORM_PITCH;
use crate::resources::LumpSource;

/// 音效编号（音效表下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SfxId(pub usize);

impl SfxId {
    /// 保留的"无音效"条目
    pub const NONE: SfxId = SfxId(0);
}

/// lump 查找结果缓存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LumpCache {
    /// 尚未查找
    #[default]
    Unresolved,
    /// 已查找，资源中不存在
    Missing,
    /// 已找到
    Found(usize),
}

impl LumpCache {
    /// 已找到的 lump 编号
    pub fn lump(self) -> Option<usize> {
        match self {
            LumpCache::Found(lump) => Some(lump),
            _ => None,
        }
    }
}

/// 音效描述
#[derive(Debug, Clone, PartialEq)]
pub struct SfxInfo {
    /// 表内编号
    pub id: SfxId,
    /// 不含 `DS` 前缀的名字
    pub name: String,
    /// 优先级
    pub priority: i32,
    /// 链接音效使用的固定音高
    pub pitch: i32,
    /// 链接音效的音量偏移
    pub volume: i32,
    /// lump 缓存
    pub lumpnum: LumpCache,
    /// 替换链接
    pub link: Option<SfxId>,
}

impl SfxInfo {
    fn new(id: SfxId, name: &str, priority: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            priority,
            pitch: -1,
            volume: -1,
            lumpnum: LumpCache::Unresolved,
            link: None,
        }
    }

    /// lump 名字：`DS` + 音效名
    pub fn lump_name(&self) -> String {
        format!("DS{}", self.name)
    }
}

/// 取音效对应的 lump 编号，首次查找后缓存在描述上
pub fn get_sfx_lump_num(sfx: &mut SfxInfo, lumps: &dyn LumpSource) -> Option<usize> {
    if sfx.lumpnum == LumpCache::Unresolved {
        sfx.lumpnum = match lumps.check_num_for_name(&sfx.lump_name()) {
            Some(lump) => LumpCache::Found(lump),
            None => LumpCache::Missing,
        };
    }
    sfx.lumpnum.lump()
}

/// 常缺失音效的替换链：缺失的音效依次退化为更常见的音效，`None` 表示静音
pub const SFX_SUBSTITUTIONS: &[(&str, Option<&str>)] = &[
    ("secret", Some("itmbk")),
    ("itmbk", Some("getpow")),
    ("getpow", Some("itemup")),
    ("itemup", None),
    ("splash", Some("oof")),
    ("ploosh", Some("oof")),
    ("lvsiz", Some("oof")),
    ("splsml", None),
    ("plosml", None),
    ("lavsml", None),
];

/// 音效表
#[derive(Debug, Clone)]
pub struct SfxTable {
    sounds: Vec<SfxInfo>,
}

impl Default for SfxTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SfxTable {
    /// 只含保留条目的空表
    pub fn new() -> Self {
        Self {
            sounds: vec![SfxInfo::new(SfxId::NONE, "", 0)],
        }
    }

    /// 由 (名字, 优先级) 列表构建
    pub fn with_sounds(sounds: &[(&str, i32)]) -> Self {
        let mut table = Self::new();
        for (name, priority) in sounds {
            table.add(name, *priority);
        }
        table
    }

    /// 追加音效
    pub fn add(&mut self, name: &str, priority: i32) -> SfxId {
        let id = SfxId(self.sounds.len());
        self.sounds.push(SfxInfo::new(id, name, priority));
        id
    }

    /// 条目数（含保留条目）
    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    /// 是否只有保留条目
    pub fn is_empty(&self) -> bool {
        self.sounds.len() <= 1
    }

    pub fn get(&self, id: SfxId) -> Option<&SfxInfo> {
        self.sounds.get(id.0)
    }

    pub fn get_mut(&mut self, id: SfxId) -> Option<&mut SfxInfo> {
        self.sounds.get_mut(id.0)
    }

    /// 按名字查找
    pub fn find(&self, name: &str) -> Option<SfxId> {
        self.sounds
            .iter()
            .skip(1)
            .find(|sfx| sfx.name.eq_ignore_ascii_case(name))
            .map(|sfx| sfx.id)
    }

    /// 可播放的音效编号（跳过保留条目与空名字）
    pub fn playable_ids(&self) -> Vec<SfxId> {
        self.sounds
            .iter()
            .skip(1)
            .filter(|sfx| !sfx.name.is_empty())
            .map(|sfx| sfx.id)
            .collect()
    }

    /// 沿替换链接找到最终播放的音效
    ///
    /// 链接成环时在走完整张表后停止。
    pub fn resolve(&self, id: SfxId) -> SfxId {
        let mut current = id;
        for _ in 0..self.sounds.len() {
            match self.get(current).and_then(|sfx| sfx.link) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// 为资源中缺失的音效安装替换链接
    ///
    /// 源音效已有 lump 时保持不变。返回安装的链接数。
    pub fn install_substitution_links(&mut self, lumps: &dyn LumpSource) -> usize {
        let mut installed = 0;
        for (from, to) in SFX_SUBSTITUTIONS {
            let Some(from_id) = self.find(from) else {
                continue;
            };
            let to_id = match to {
                Some(name) => match self.find(name) {
                    Some(id) => id,
                    None => continue,
                },
                None => SfxId::NONE,
            };

            let Some(sfx) = self.get_mut(from_id) else {
                continue;
            };
            if get_sfx_lump_num(sfx, lumps).is_none() {
                sfx.link = Some(to_id);
                sfx.pitch = NORM_PITCH;
                sfx.volume = 0;
                installed += 1;
            }
        }
        installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{WadFile, WadKind};

    fn table() -> SfxTable {
        SfxTable::with_sounds(&[
            ("pistol", 64),
            ("secret", 60),
            ("itmbk", 100),
            ("getpow", 60),
            ("itemup", 78),
            ("splash", 100),
            ("oof", 96),
        ])
    }

    #[test]
    fn test_lump_lookup_is_cached() {
        let wad = WadFile::from_lumps(WadKind::Pwad, vec![("DSPISTOL", vec![0u8; 4])]);
        let mut table = table();
        let id = table.find("pistol").unwrap();
        let sfx = table.get_mut(id).unwrap();

        assert_eq!(get_sfx_lump_num(sfx, &wad), Some(0));
        assert_eq!(sfx.lumpnum, LumpCache::Found(0));

        let empty = WadFile::from_lumps(WadKind::Pwad, Vec::<(&str, Vec<u8>)>::new());
        assert_eq!(get_sfx_lump_num(sfx, &empty), Some(0));
    }

    #[test]
    fn test_missing_lump_is_remembered() {
        let wad = WadFile::from_lumps(WadKind::Pwad, Vec::<(&str, Vec<u8>)>::new());
        let mut table = table();
        let sfx = table.get_mut(SfxId(1)).unwrap();
        assert_eq!(get_sfx_lump_num(sfx, &wad), None);
        assert_eq!(sfx.lumpnum, LumpCache::Missing);
    }

    #[test]
    fn test_substitution_chain() {
        let wad = WadFile::from_lumps(
            WadKind::Iwad,
            vec![("DSGETPOW", vec![0u8; 4]), ("DSOOF", vec![0u8; 4])],
        );
        let mut table = table();
        let installed = table.install_substitution_links(&wad);

        let secret = table.find("secret").unwrap();
        let getpow = table.find("getpow").unwrap();
        let splash = table.find("splash").unwrap();
        let oof = table.find("oof").unwrap();
        let itemup = table.find("itemup").unwrap();

        // secret -> itmbk -> getpow; itemup -> none; splash -> oof
        assert_eq!(installed, 4);
        assert_eq!(table.resolve(secret), getpow);
        assert_eq!(table.resolve(splash), oof);
        assert_eq!(table.resolve(itemup), SfxId::NONE);
        assert!(table.get(getpow).unwrap().link.is_none());

        let linked = table.get(secret).unwrap();
        assert_eq!(linked.pitch, NORM_PITCH);
        assert_eq!(linked.volume, 0);
    }

    #[test]
    fn test_resolve_stops_on_cycle() {
        let mut table = table();
        table.get_mut(SfxId(1)).unwrap().link = Some(SfxId(2));
        table.get_mut(SfxId(2)).unwrap().link = Some(SfxId(1));
        let resolved = table.resolve(SfxId(1));
        assert!(resolved == SfxId(1) || resolved == SfxId(2));
    }

    #[test]
    fn test_playable_ids_skip_reserved() {
        let table = table();
        let ids = table.playable_ids();
        assert_eq!(ids.len(), 7);
        assert!(!ids.contains(&SfxId::NONE));
    }
}
