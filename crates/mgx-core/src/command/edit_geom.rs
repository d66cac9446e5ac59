//! 修改已有实体的几何命令
//!
//! 与构造命令不同，修改命令会作废一部分输入实体，用新实体替换它们。
//! 执行前保存所有受影响实体的备忘录；新实体继承被替换实体的分组。

use super::create_geom::{geom_redo, geom_rollback, geom_undo, GeomCommandState, GeomScope};
use super::{Command, CommandCore};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::Result;
use crate::info_command::ChangeKind;
use std::collections::BTreeSet;

/// 修改操作的结果
#[derive(Debug, Clone, Default)]
pub struct GeomModification {
    /// 被作废的实体
    pub removed: Vec<EntityId>,

    /// 保留但内部数据变化的实体
    pub kept: Vec<EntityId>,

    /// 显示需要更新的实体
    pub moved: Vec<EntityId>,

    /// (被替换的实体, 替换它的新实体)
    pub replaced: Vec<(EntityId, EntityId)>,
}

/// 修改类几何操作
pub trait EditOperation: Send {
    fn name(&self) -> &'static str;

    /// 操作的输入实体
    fn ref_entities(&self) -> Vec<EntityId>;

    fn dim_new_group(&self) -> Dim {
        Dim::Volume
    }

    fn validate(&self, ctx: &Context) -> Result<()>;

    fn modify(&mut self, scope: &mut GeomScope<'_>) -> Result<GeomModification>;
}

/// 修改命令
pub struct CommandEditGeom<O> {
    core: CommandCore,
    state: GeomCommandState,
    op: O,
    modification: GeomModification,
}

impl<O: EditOperation> CommandEditGeom<O> {
    pub fn with_operation(ctx: &Context, op: O, group_name: impl Into<String>) -> Result<Self> {
        op.validate(ctx)?;
        Ok(Self {
            core: CommandCore::new(op.name()),
            state: GeomCommandState::new(group_name, op.dim_new_group()),
            op,
            modification: GeomModification::default(),
        })
    }

    pub fn operation(&self) -> &O {
        &self.op
    }

    pub fn created_entities(&self) -> &[EntityId] {
        self.state.created()
    }

    /// 最近一次执行作废的实体
    pub fn removed_entities(&self) -> &[EntityId] {
        &self.modification.removed
    }

    pub fn modification(&self) -> &GeomModification {
        &self.modification
    }
}

/// 保存输入实体、它们的边界及直接邻居的备忘录
fn save_ref_mementos(scope: &mut GeomScope<'_>, refs: &[EntityId]) -> Result<()> {
    let closure = scope.ctx.geom.downward_closure(refs)?;
    let mut touched: BTreeSet<EntityId> = closure.clone();
    for id in &closure {
        touched.extend(scope.ctx.geom.entity(*id)?.shape.upper().iter().copied());
    }
    for id in touched {
        scope.save_memento(id)?;
    }
    Ok(())
}

/// 新实体的分组：被替换实体的分组优先，其次命令分组或默认分组
fn update_groups(scope: &mut GeomScope<'_>, replaced: &[(EntityId, EntityId)]) -> Result<()> {
    for (old, new) in replaced {
        if scope.ctx.geom.is_live(*new) {
            scope.group_helper().copy_groups(*old, *new)?;
        }
    }
    let created = scope.state.created().to_vec();
    for id in created {
        let entity = scope.ctx.geom.entity(id)?;
        if !entity.destroyed && entity.groups.is_empty() {
            scope.add_to_group(id, false)?;
        }
    }
    Ok(())
}

impl<O: EditOperation> Command for CommandEditGeom<O> {
    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore {
        &mut self.core
    }

    fn internal_execute(&mut self, ctx: &mut Context) -> Result<()> {
        self.state.reset();
        self.modification = GeomModification::default();
        let refs = self.op.ref_entities();

        let mut scope = GeomScope::new(ctx, &mut self.core.info, &mut self.state);
        save_ref_mementos(&mut scope, &refs)?;
        let modification = self.op.modify(&mut scope)?;

        for id in &modification.kept {
            scope.mark(*id, ChangeKind::Modified)?;
        }
        for id in &modification.moved {
            scope.mark(*id, ChangeKind::DispModified)?;
        }
        scope.set_destroy(&modification.removed)?;
        update_groups(&mut scope, &modification.replaced)?;
        let created = scope.state.created().to_vec();
        scope.ensure_grouped(&created)?;

        self.modification = modification;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut Context) {
        geom_rollback(&mut self.core, &mut self.state, ctx);
        self.modification = GeomModification::default();
    }

    fn internal_undo(&mut self, ctx: &mut Context) -> Result<()> {
        geom_undo(&mut self.core, &mut self.state, ctx)
    }

    fn internal_redo(&mut self, ctx: &mut Context) -> Result<()> {
        geom_redo(&mut self.core, &mut self.state, ctx)
    }
}
