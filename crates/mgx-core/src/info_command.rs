//! 命令变更记录
//!
//! 每个命令在执行时记录它触及的每个实体和分组，以及变更类型。
//! 撤销和重做不重新计算几何，而是通过 `perm_created_deleted`
//! 互换"创建"和"删除"标记并同步实体的销毁状态。

use crate::entity::{Dim, EntityId};
use crate::error::Result;
use crate::geom_manager::GeomManager;
use crate::group::{GroupId, GroupManager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// 变更类型，按重要性递增排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// 未初始化
    Uninitialized,
    /// 显示表示不变的修改
    Modified,
    /// 显示表示需要重建
    DispModified,
    /// 可见性改变
    VisibilityChanged,
    Created,
    /// 标记为销毁
    Deleted,
    /// 重新启用（分组）
    Enable,
    /// 重新启用后再次隐藏（分组）
    Disable,
    /// 忽略
    None,
}

impl ChangeKind {
    /// 撤销/重做时的互换
    pub fn permuted(self) -> Self {
        match self {
            ChangeKind::Created => ChangeKind::Deleted,
            ChangeKind::Deleted => ChangeKind::Created,
            other => other,
        }
    }

    /// 分组的互换，额外处理启用/禁用
    fn permuted_for_group(self) -> Self {
        match self {
            ChangeKind::Enable => ChangeKind::Disable,
            ChangeKind::Disable => ChangeKind::Enable,
            other => other.permuted(),
        }
    }
}

/// 记录中的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeomEntityInfo {
    pub entity: EntityId,
    pub dim: Dim,
    pub kind: ChangeKind,
}

/// 命令变更记录
#[derive(Debug, Clone, Default)]
pub struct InfoCommand {
    /// 实体变更，按插入顺序
    geom_entities: Vec<GeomEntityInfo>,

    /// 分组变更，每个分组只保留最重要的类型
    group_entities: BTreeMap<GroupId, ChangeKind>,
}

impl InfoCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一行，同一实体的多次记录都会保留
    pub fn add_geom_info_entity(&mut self, entity: EntityId, dim: Dim, kind: ChangeKind) {
        debug!("Ledger: {} {} -> {:?}", dim, entity, kind);
        self.geom_entities.push(GeomEntityInfo { entity, dim, kind });
    }

    /// 记录分组变更，只有更重要的类型才会替换已有记录
    pub fn add_group_info_entity(&mut self, group: GroupId, kind: ChangeKind) {
        let current = self
            .group_entities
            .entry(group)
            .or_insert(ChangeKind::Uninitialized);
        if *current < kind {
            *current = kind;
        }
    }

    /// 所有实体记录
    pub fn geom_info_entities(&self) -> &[GeomEntityInfo] {
        &self.geom_entities
    }

    /// 所有分组记录
    pub fn group_info_entities(&self) -> &BTreeMap<GroupId, ChangeKind> {
        &self.group_entities
    }

    pub fn group_info(&self, group: GroupId) -> Option<ChangeKind> {
        self.group_entities.get(&group).copied()
    }

    /// 指定类型的实体
    pub fn entities_with(&self, kind: ChangeKind) -> Vec<EntityId> {
        self.geom_entities
            .iter()
            .filter(|row| row.kind == kind)
            .map(|row| row.entity)
            .collect()
    }

    /// 指定类型和维度的实体
    pub fn entities_with_dim(&self, kind: ChangeKind, dim: Dim) -> Vec<EntityId> {
        self.geom_entities
            .iter()
            .filter(|row| row.kind == kind && row.dim == dim)
            .map(|row| row.entity)
            .collect()
    }

    /// 实体在记录中的最后一个类型
    pub fn last_kind(&self, entity: EntityId) -> Option<ChangeKind> {
        self.geom_entities
            .iter()
            .rev()
            .find(|row| row.entity == entity)
            .map(|row| row.kind)
    }

    pub fn nb_geom_info_entities(&self) -> usize {
        self.geom_entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geom_entities.is_empty() && self.group_entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.geom_entities.clear();
        self.group_entities.clear();
    }

    /// 互换创建/删除标记，并同步实体和分组的销毁状态
    ///
    /// 连续调用两次得到原来的记录。某一行的实体找不到时记录错误并继续，
    /// 所有行处理完后返回第一个错误。
    pub fn perm_created_deleted(
        &mut self,
        geom: &mut GeomManager,
        groups: &mut GroupManager,
    ) -> Result<()> {
        let mut first_error = None;
        for row in &mut self.geom_entities {
            row.kind = row.kind.permuted();
            let destroyed = match row.kind {
                ChangeKind::Created => false,
                ChangeKind::Deleted => true,
                _ => continue,
            };
            match geom.entity_mut(row.entity) {
                Ok(entity) => entity.destroyed = destroyed,
                Err(err) => {
                    error!("Ledger flip of {}: {}", row.entity, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        for (group, kind) in self.group_entities.iter_mut() {
            *kind = kind.permuted_for_group();
            let destroyed = match kind {
                ChangeKind::Created | ChangeKind::Enable => false,
                ChangeKind::Deleted | ChangeKind::Disable => true,
                _ => continue,
            };
            if let Some(g) = groups.group_mut(*group) {
                g.destroyed = destroyed;
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 标记一批实体为删除，并修复邻接关系
    pub fn set_destroy_and_update_connectivity(
        &mut self,
        geom: &mut GeomManager,
        removed: &[EntityId],
    ) -> Result<()> {
        for id in removed {
            let dim = geom.entity(*id)?.dim();
            self.add_geom_info_entity(*id, dim, ChangeKind::Deleted);
        }
        geom.destroy_and_unlink(removed)
    }
}
