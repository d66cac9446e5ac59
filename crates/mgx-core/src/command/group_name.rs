//! 修改实体的分组
//!
//! 执行时保存每个实体修改前后的分组名，撤销/重做恢复对应的一份，
//! 再互换变更记录，使分组的销毁状态与记录一致。

use super::{Command, CommandCore};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use crate::info_command::{ChangeKind, InfoCommand};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 分组修改方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEditKind {
    /// 加入分组
    Add,
    /// 移出分组
    Remove,
    /// 替换为唯一的分组
    Set,
    /// 移出该分组的所有成员
    Clear,
}

/// 实体修改前后的分组名
#[derive(Debug, Clone, Default)]
struct GroupArchive {
    before: Vec<String>,
    after: Vec<String>,
}

/// 加入/移出/设置分组的命令
pub struct CommandAddRemoveGroupName {
    core: CommandCore,
    entities: Vec<EntityId>,
    dim: Dim,
    group_name: String,
    kind: GroupEditKind,
    archives: Vec<(EntityId, GroupArchive)>,
}

impl CommandAddRemoveGroupName {
    pub fn new(
        ctx: &Context,
        entities: Vec<EntityId>,
        dim: Dim,
        group_name: impl Into<String>,
        kind: GroupEditKind,
    ) -> Result<Self> {
        let group_name = group_name.into();
        if entities.is_empty() {
            return Err(CommandError::Validation("no entity selected".to_string()));
        }
        for id in &entities {
            let entity = ctx.geom.live(*id)?;
            if entity.dim() != dim {
                return Err(CommandError::WrongDimension {
                    id: *id,
                    expected: dim,
                    actual: entity.dim(),
                });
            }
        }
        if kind == GroupEditKind::Remove {
            ctx.groups.get_group(dim, &group_name, true)?;
        }

        let name = match kind {
            GroupEditKind::Add => "AddToGroup",
            GroupEditKind::Remove => "RemoveFromGroup",
            GroupEditKind::Set => "SetGroup",
            GroupEditKind::Clear => "ClearGroup",
        };
        Ok(Self {
            core: CommandCore::new(name),
            entities,
            dim,
            group_name,
            kind,
            archives: Vec::new(),
        })
    }

    /// 清空分组，成员在执行时确定
    pub fn clear(ctx: &Context, dim: Dim, group_name: impl Into<String>) -> Result<Self> {
        let group_name = group_name.into();
        let group = ctx
            .groups
            .get_group(dim, &group_name, true)?
            .and_then(|id| ctx.groups.group(id));
        if group.is_some_and(|g| g.is_default) {
            return Err(CommandError::Validation(format!(
                "default group {group_name} cannot be cleared"
            )));
        }
        Ok(Self {
            core: CommandCore::new("ClearGroup"),
            entities: Vec::new(),
            dim,
            group_name,
            kind: GroupEditKind::Clear,
            archives: Vec::new(),
        })
    }

    /// 被修改的实体
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn kind(&self) -> GroupEditKind {
        self.kind
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// 恢复存档的分组名
    ///
    /// 成员变化已记录在执行时的记录中，这里的变更不再记录。
    fn apply_archive(&self, ctx: &mut Context, use_before: bool) -> Result<()> {
        let mut replay = InfoCommand::new();
        for (id, archive) in &self.archives {
            let names = if use_before { &archive.before } else { &archive.after };
            ctx.group_helper(&mut replay).replace_groups(*id, names)?;
        }
        Ok(())
    }

    /// 恢复一份存档并互换记录
    fn swap(&mut self, ctx: &mut Context, use_before: bool) -> Result<()> {
        let restored = self.apply_archive(ctx, use_before);
        let flipped = self
            .core
            .info
            .perm_created_deleted(&mut ctx.geom, &mut ctx.groups);
        restored.and(flipped)
    }
}

impl Command for CommandAddRemoveGroupName {
    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore {
        &mut self.core
    }

    fn internal_execute(&mut self, ctx: &mut Context) -> Result<()> {
        self.archives.clear();
        if self.kind == GroupEditKind::Clear {
            let group = ctx.groups.get_group(self.dim, &self.group_name, true)?;
            self.entities = group
                .and_then(|id| ctx.groups.group(id))
                .map(|g| g.entities().to_vec())
                .unwrap_or_default()
                .into_iter()
                .filter(|id| ctx.geom.is_live(*id))
                .collect();
        }
        for id in self.entities.clone() {
            let mut helper = ctx.group_helper(&mut self.core.info);
            let before = helper.group_names(id)?;
            match self.kind {
                GroupEditKind::Add => {
                    helper.add_to_group(id, &self.group_name)?;
                }
                GroupEditKind::Remove | GroupEditKind::Clear => {
                    helper.remove_from_group(id, &self.group_name)?
                }
                GroupEditKind::Set => helper.set_group(id, &self.group_name)?,
            }
            let after = helper.group_names(id)?;
            debug!("{} groups: {:?} -> {:?}", id, before, after);
            self.core
                .info
                .add_geom_info_entity(id, self.dim, ChangeKind::DispModified);
            self.archives.push((id, GroupArchive { before, after }));
        }
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut Context) {
        if let Err(err) = self.apply_archive(ctx, true) {
            tracing::error!("rollback of {}: {}", self.core.unique_name(), err);
        }
        super::rollback_ledger(&mut self.core.info, ctx);
    }

    fn internal_undo(&mut self, ctx: &mut Context) -> Result<()> {
        if !self.core.is_preview_mode() {
            ctx.kernel.undo()?;
        }
        self.swap(ctx, true)
    }

    fn internal_redo(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.kernel.redo()?;
        self.swap(ctx, false)
    }
}
