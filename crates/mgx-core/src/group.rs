//! 分组管理
//!
//! 每个维度（0D-3D）都有自己的命名分组。不属于任何显式分组的实体
//! 放在该维度的默认分组（"Hors Groupe 2D" 等）中：
//! - 实体加入显式分组时先离开默认分组
//! - 实体离开最后一个显式分组时回到默认分组
//!
//! 拉伸、棱柱等操作会把低维实体的分组传递给它们生成的高维实体。

use crate::entity::{Dim, EntityId};
use crate::error::Result;
use crate::geom_manager::GeomManager;
use crate::info_command::{ChangeKind, InfoCommand};
use crate::mesh::MeshManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// 分组唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// 新建分组的默认层级
pub const DEFAULT_LEVEL: u32 = 1;

/// 分组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntity {
    /// 分组ID
    pub id: GroupId,

    /// 分组名称
    pub name: String,

    /// 分组维度，成员都是该维度的实体
    pub dim: Dim,

    /// 界面分类用的层级
    pub level: u32,

    /// 是否为默认分组
    pub is_default: bool,

    /// 是否已销毁
    pub destroyed: bool,

    /// 成员
    entities: Vec<EntityId>,
}

impl GroupEntity {
    pub fn new(id: GroupId, name: impl Into<String>, dim: Dim, is_default: bool) -> Self {
        Self {
            id,
            name: name.into(),
            dim,
            level: DEFAULT_LEVEL,
            is_default,
            destroyed: false,
            entities: Vec::new(),
        }
    }

    /// 添加成员，已是成员时返回错误
    pub fn add(&mut self, entity: EntityId) -> std::result::Result<(), GroupError> {
        if self.find(entity) {
            return Err(GroupError::AlreadyMember {
                group: self.name.clone(),
                entity,
            });
        }
        self.entities.push(entity);
        Ok(())
    }

    /// 移除成员
    pub fn remove(
        &mut self,
        entity: EntityId,
        exception_if_not_found: bool,
    ) -> std::result::Result<(), GroupError> {
        match self.entities.iter().position(|e| *e == entity) {
            Some(pos) => {
                self.entities.remove(pos);
                Ok(())
            }
            None if exception_if_not_found => Err(GroupError::NotMember {
                group: self.name.clone(),
                entity,
            }),
            None => Ok(()),
        }
    }

    pub fn find(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn nb(&self) -> usize {
        self.entities.len()
    }
}

/// 分组ID分配状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    next_id: u64,
}

/// 分组管理器
#[derive(Debug, Clone)]
pub struct GroupManager {
    /// 所有分组（包括已销毁的）
    groups: BTreeMap<GroupId, GroupEntity>,

    /// 下一个分组ID
    next_id: u64,
}

impl GroupManager {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// 维度的默认分组名
    pub fn default_name(dim: Dim) -> String {
        format!("Hors Groupe {}D", dim.index())
    }

    /// 按名称查找，包括已销毁的分组
    fn find(&self, dim: Dim, name: &str) -> Option<GroupId> {
        self.groups
            .values()
            .find(|g| g.dim == dim && g.name == name)
            .map(|g| g.id)
    }

    /// 按名称获取未销毁的分组
    pub fn get_group(
        &self,
        dim: Dim,
        name: &str,
        exception_if_not_found: bool,
    ) -> std::result::Result<Option<GroupId>, GroupError> {
        let found = self
            .find(dim, name)
            .filter(|id| self.groups.get(id).is_some_and(|g| !g.destroyed));
        match found {
            None if exception_if_not_found => Err(GroupError::GroupNotFound {
                dim,
                name: name.to_string(),
            }),
            other => Ok(other),
        }
    }

    /// 获取或创建分组，名称为空时使用默认分组
    ///
    /// 新建的分组记为 `Created`，重新启用的已销毁分组记为 `Enable`，
    /// 其他情况记为 `DispModified`。
    pub fn get_new_group(&mut self, dim: Dim, name: &str, info: &mut InfoCommand) -> GroupId {
        let default_name = Self::default_name(dim);
        let name = if name.is_empty() { default_name.as_str() } else { name };

        if let Some(id) = self.find(dim, name) {
            if let Some(group) = self.groups.get_mut(&id) {
                if group.destroyed {
                    group.destroyed = false;
                    info.add_group_info_entity(id, ChangeKind::Enable);
                } else {
                    info.add_group_info_entity(id, ChangeKind::DispModified);
                }
            }
            return id;
        }

        let id = GroupId(self.next_id);
        self.next_id += 1;
        let group = GroupEntity::new(id, name, dim, name == default_name);
        debug!("New {} group {} ({})", dim, group.name, id);
        self.groups.insert(id, group);
        info.add_group_info_entity(id, ChangeKind::Created);
        id
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupEntity> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut GroupEntity> {
        self.groups.get_mut(&id)
    }

    /// 指定维度的未销毁分组
    pub fn groups(&self, dim: Dim) -> Vec<&GroupEntity> {
        self.groups
            .values()
            .filter(|g| g.dim == dim && !g.destroyed)
            .collect()
    }

    pub fn nb_groups(&self, dim: Dim) -> usize {
        self.groups(dim).len()
    }

    /// 管理器中的分组总数（包括已销毁的）
    pub fn nb_stored(&self) -> usize {
        self.groups.len()
    }

    /// 保存分组ID分配状态
    pub fn checkpoint(&self) -> GroupSnapshot {
        GroupSnapshot {
            next_id: self.next_id,
        }
    }

    /// 恢复分组ID分配状态，不会回退到仍在管理器中的分组ID之下
    pub fn restore(&mut self, snapshot: GroupSnapshot) {
        let in_use = self.groups.keys().next_back().map_or(1, |id| id.0 + 1);
        self.next_id = snapshot.next_id.max(in_use);
    }

    /// 下一个将被分配的分组ID
    pub fn next_id(&self) -> GroupId {
        GroupId(self.next_id)
    }

    /// 命令成功执行后调用：销毁变空的分组，重新启用有了成员的已销毁分组
    ///
    /// 只检查记录中出现过的分组，其他命令的分组不受影响。
    pub fn update_deleted_groups(&mut self, info: &mut InfoCommand) {
        let touched: Vec<GroupId> = info.group_info_entities().keys().copied().collect();
        for id in touched {
            let Some(group) = self.groups.get_mut(&id) else {
                continue;
            };
            if group.is_empty() && !group.destroyed {
                group.destroyed = true;
                info.add_group_info_entity(group.id, ChangeKind::Deleted);
            } else if !group.is_empty() && group.destroyed {
                group.destroyed = false;
                info.add_group_info_entity(group.id, ChangeKind::Enable);
            }
        }
    }

    /// 从管理器中物理删除分组
    pub fn delete_group(&mut self, id: GroupId) -> Option<GroupEntity> {
        self.groups.remove(&id)
    }

    /// 从所有分组中移除一个成员（实体被物理删除时）
    pub fn forget_entity(&mut self, entity: EntityId, groups: &[GroupId]) {
        for id in groups {
            if let Some(group) = self.groups.get_mut(id) {
                let _ = group.remove(entity, false);
            }
        }
    }
}

impl Default for GroupManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 低维分组传递到高维时对默认分组的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultGroupPolicy {
    /// 第一个分组若是默认分组，改为高一维的默认分组
    Translate,
    /// 跳过默认分组
    Skip,
}

/// 分组操作，同时维护分组成员、实体的分组引用和变更记录
pub struct GroupHelper<'a> {
    geom: &'a mut GeomManager,
    groups: &'a mut GroupManager,
    mesh: &'a mut dyn MeshManager,
    info: &'a mut InfoCommand,
}

impl<'a> GroupHelper<'a> {
    pub fn new(
        geom: &'a mut GeomManager,
        groups: &'a mut GroupManager,
        mesh: &'a mut dyn MeshManager,
        info: &'a mut InfoCommand,
    ) -> Self {
        Self {
            geom,
            groups,
            mesh,
            info,
        }
    }

    /// 直接把实体加入分组，不处理默认分组
    pub fn link(&mut self, group: GroupId, entity: EntityId) -> Result<()> {
        let dim = self.geom.entity(entity)?.dim();
        let g = self
            .groups
            .group_mut(group)
            .ok_or(GroupError::UnknownGroup(group))?;
        if g.dim != dim {
            return Err(GroupError::DimensionMismatch {
                group: g.name.clone(),
                expected: g.dim,
                actual: dim,
            }
            .into());
        }
        g.add(entity)?;
        self.geom.entity_mut(entity)?.groups.push(group);
        self.info.add_group_info_entity(group, ChangeKind::DispModified);
        Ok(())
    }

    /// 直接把实体移出分组，不处理默认分组
    pub fn unlink(&mut self, group: GroupId, entity: EntityId) -> Result<()> {
        self.groups
            .group_mut(group)
            .ok_or(GroupError::UnknownGroup(group))?
            .remove(entity, true)?;
        self.geom.entity_mut(entity)?.groups.retain(|g| *g != group);
        self.info.add_group_info_entity(group, ChangeKind::DispModified);
        Ok(())
    }

    /// 实体所属的默认分组
    fn default_group_of(&self, entity: EntityId) -> Result<Option<GroupId>> {
        Ok(self
            .geom
            .entity(entity)?
            .groups
            .iter()
            .copied()
            .find(|g| self.groups.group(*g).is_some_and(|g| g.is_default)))
    }

    fn notify_mesh(&mut self, entity: EntityId, dim: Dim, group: GroupId, added: bool) {
        if dim == Dim::Vertex {
            return;
        }
        if let Some(g) = self.groups.group(group) {
            self.mesh.update_group_mesh(entity, dim, &g.name, added);
        }
    }

    /// 加入分组，名称为空时加入默认分组
    ///
    /// 加入显式分组时实体离开默认分组；已是成员时不做任何事。
    pub fn add_to_group(&mut self, entity: EntityId, name: &str) -> Result<GroupId> {
        let dim = self.geom.entity(entity)?.dim();
        let group = self.groups.get_new_group(dim, name, self.info);
        if self.groups.group(group).is_some_and(|g| g.find(entity)) {
            return Ok(group);
        }

        let is_default = self.groups.group(group).is_some_and(|g| g.is_default);
        if !is_default {
            if let Some(default) = self.default_group_of(entity)? {
                self.unlink(default, entity)?;
                self.notify_mesh(entity, dim, default, false);
            }
        }
        self.link(group, entity)?;
        self.notify_mesh(entity, dim, group, true);
        Ok(group)
    }

    /// 移出分组，不再属于任何分组时回到默认分组
    pub fn remove_from_group(&mut self, entity: EntityId, name: &str) -> Result<()> {
        let dim = self.geom.entity(entity)?.dim();
        let group = self
            .groups
            .get_group(dim, name, true)?
            .ok_or_else(|| GroupError::GroupNotFound {
                dim,
                name: name.to_string(),
            })?;
        self.unlink(group, entity)?;
        self.notify_mesh(entity, dim, group, false);

        if self.geom.entity(entity)?.groups.is_empty() {
            let default = self.groups.get_new_group(dim, "", self.info);
            self.link(default, entity)?;
            self.notify_mesh(entity, dim, default, true);
        }
        Ok(())
    }

    /// 替换实体的所有分组
    pub fn set_group(&mut self, entity: EntityId, name: &str) -> Result<()> {
        let dim = self.geom.entity(entity)?.dim();
        let current = self.geom.entity(entity)?.groups.clone();
        for group in current {
            self.unlink(group, entity)?;
            self.notify_mesh(entity, dim, group, false);
        }
        self.add_to_group(entity, name)?;
        Ok(())
    }

    /// 把实体的分组恢复为给定的名称列表（撤销/重做分组修改）
    pub fn replace_groups(&mut self, entity: EntityId, names: &[String]) -> Result<()> {
        let dim = self.geom.entity(entity)?.dim();
        let current = self.geom.entity(entity)?.groups.clone();
        for group in current {
            self.unlink(group, entity)?;
            self.notify_mesh(entity, dim, group, false);
        }
        for name in names {
            let group = self.groups.get_new_group(dim, name, self.info);
            self.link(group, entity)?;
            self.notify_mesh(entity, dim, group, true);
        }
        Ok(())
    }

    /// 实体所属分组的名称
    pub fn group_names(&self, entity: EntityId) -> Result<Vec<String>> {
        Ok(self
            .geom
            .entity(entity)?
            .groups
            .iter()
            .filter_map(|g| self.groups.group(*g))
            .map(|g| g.name.clone())
            .collect())
    }

    /// 新实体继承被替换实体的分组（同一维度）
    pub fn copy_groups(&mut self, from: EntityId, to: EntityId) -> Result<()> {
        for name in self.group_names(from)? {
            self.add_to_group(to, &name)?;
        }
        Ok(())
    }

    /// 把低维实体的分组传递给它生成的高一维实体，保留层级
    pub fn groups_to_upper_dim(
        &mut self,
        pairs: &[(EntityId, EntityId)],
        policy: DefaultGroupPolicy,
    ) -> Result<()> {
        for (source, target) in pairs {
            let source_dim = self.geom.entity(*source)?.dim();
            let target_dim = self.geom.entity(*target)?.dim();
            let source_default = GroupManager::default_name(source_dim);
            let sources: Vec<(String, u32)> = self
                .geom
                .entity(*source)?
                .groups
                .iter()
                .filter_map(|g| self.groups.group(*g))
                .map(|g| (g.name.clone(), g.level))
                .collect();

            for (i, (name, level)) in sources.into_iter().enumerate() {
                let group = match policy {
                    DefaultGroupPolicy::Translate => {
                        let name = if i == 0 && name == source_default {
                            GroupManager::default_name(target_dim)
                        } else {
                            name
                        };
                        let group = self.groups.get_new_group(target_dim, &name, self.info);
                        self.link(group, *target)?;
                        group
                    }
                    DefaultGroupPolicy::Skip => {
                        if name == source_default {
                            continue;
                        }
                        self.add_to_group(*target, &name)?
                    }
                };
                if let Some(g) = self.groups.group_mut(group) {
                    g.level = level;
                }
            }
        }
        Ok(())
    }

    /// 复制得到的实体加入带前缀的分组，曲面另外加入前缀分组本身
    pub fn prefix_groups_name(&mut self, prefix: &str, pairs: &[(EntityId, EntityId)]) -> Result<()> {
        for (source, copy) in pairs {
            for name in self.group_names(*source)? {
                self.add_to_group(*copy, &format!("{prefix}_{name}"))?;
            }
            if self.geom.entity(*copy)?.dim() == Dim::Surface {
                self.add_to_group(*copy, prefix)?;
            }
        }
        Ok(())
    }
}

/// 分组操作错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    #[error("Entity {entity} is already in group {group}")]
    AlreadyMember { group: String, entity: EntityId },

    #[error("Entity {entity} is not in group {group}")]
    NotMember { group: String, entity: EntityId },

    #[error("Group not found: {name} ({dim})")]
    GroupNotFound { dim: Dim, name: String },

    #[error("Unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("Group {group} holds {expected} entities, got a {actual} entity")]
    DimensionMismatch {
        group: String,
        expected: Dim,
        actual: Dim,
    },
}
