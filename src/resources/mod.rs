//! 资源查找模块
//!
//! 声音子系统只需要"按名字找 lump、按编号取数据"这两种能力，
//! 由 [`LumpSource`] 描述；[`WadFile`] 是基于 IWAD/PWAD 文件的实现。

pub mod wad;

pub use wad::{WadFile, WadKind};

/// 具名 lump 查找接口
pub trait LumpSource {
    /// 按名字查找 lump 编号，找不到返回 `None`
    ///
    /// 名字不区分大小写，只比较前 8 个字符。同名时后加载的优先。
    fn check_num_for_name(&self, name: &str) -> Option<usize>;

    /// 按编号取 lump 数据
    fn lump_data(&self, lump: usize) -> Option<&[u8]>;

    /// lump 总数
    fn num_lumps(&self) -> usize;
}

/// 不含任何 lump 的空资源源
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLumps;

impl LumpSource for NoLumps {
    fn check_num_for_name(&self, _name: &str) -> Option<usize> {
        None
    }

    fn lump_data(&self, _lump: usize) -> Option<&[u8]> {
        None
    }

    fn num_lumps(&self) -> usize {
        0
    }
}
