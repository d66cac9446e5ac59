//! 名称与唯一ID分配
//!
//! 所有实体的唯一ID和名称都由 `NameManager` 分配。预览和失败的命令
//! 通过 `checkpoint()`/`restore()` 把分配状态恢复到执行前，
//! 使之后的命令得到与预览从未发生时相同的ID。

use crate::entity::{Dim, EntityId};
use serde::{Deserialize, Serialize};

/// 分配器状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSnapshot {
    next_id: u64,
    counters: [u64; 4],
}

/// 名称管理器
#[derive(Debug, Clone)]
pub struct NameManager {
    /// 下一个可用的唯一ID
    next_id: u64,

    /// 每个维度的名称计数
    counters: [u64; 4],
}

impl NameManager {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            counters: [0; 4],
        }
    }

    /// 分配唯一ID与名称
    pub fn allocate(&mut self, dim: Dim) -> (EntityId, String) {
        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;

        let counter = &mut self.counters[dim.index()];
        let name = format!("{}{:04}", dim.name_prefix(), *counter);
        *counter += 1;

        (id, name)
    }

    /// 下一个将被分配的ID
    pub fn next_id(&self) -> EntityId {
        EntityId::from_raw(self.next_id)
    }

    /// 保存当前状态
    pub fn checkpoint(&self) -> NameSnapshot {
        NameSnapshot {
            next_id: self.next_id,
            counters: self.counters,
        }
    }

    /// 恢复到快照时的状态
    pub fn restore(&mut self, snapshot: NameSnapshot) {
        self.next_id = snapshot.next_id;
        self.counters = snapshot.counters;
    }
}

impl Default for NameManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_names() {
        let mut names = NameManager::new();
        let (id1, name1) = names.allocate(Dim::Volume);
        let (id2, name2) = names.allocate(Dim::Vertex);
        let (_, name3) = names.allocate(Dim::Volume);

        assert_eq!(id1.id + 1, id2.id);
        assert_eq!(name1, "Vol0000");
        assert_eq!(name2, "Pt0000");
        assert_eq!(name3, "Vol0001");
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut names = NameManager::new();
        names.allocate(Dim::Curve);
        let snapshot = names.checkpoint();

        let (id, name) = names.allocate(Dim::Curve);
        names.allocate(Dim::Surface);
        names.restore(snapshot);

        // 恢复后重新分配得到相同的ID和名称
        assert_eq!(names.allocate(Dim::Curve), (id, name));

        // 连续两次保存/恢复不改变状态
        let again = names.checkpoint();
        names.restore(names.checkpoint());
        assert_eq!(names.checkpoint(), again);
    }
}
