//! 几何构造命令
//!
//! 几何操作通过 [`GeomScope`] 修改实体图：
//! - `store` 保存新实体并记为 `Created`
//! - `split`/`materialize` 把一个高维草图递归拆分为各维度的边界实体，每个实体只保存一次
//! - `set_destroy` 作废已有实体并修复邻接
//!
//! 修改已有实体之前会保存其形状的备忘录，撤销/重做时交换备忘录即可恢复邻接。

use super::{rollback_ledger, Command, CommandCore};
use crate::context::Context;
use crate::entity::{Curve, Dim, EntityId, GeomEntity, Shape, Surface, Vertex, Volume};
use crate::error::{CommandError, Result};
use crate::group::GroupHelper;
use crate::info_command::{ChangeKind, InfoCommand};
use crate::math::Point3;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error};

/// 几何命令的可变状态
#[derive(Debug, Clone)]
pub struct GeomCommandState {
    /// 命令分组名，空表示默认分组
    pub group_name: String,

    /// 使用命令分组的实体维度
    pub dim_new_group: Dim,

    /// 本次执行新建的实体，按创建顺序
    created: Vec<EntityId>,
    created_set: BTreeSet<EntityId>,

    /// 被修改的已有实体在修改前的形状
    mementos: BTreeMap<EntityId, Shape>,
}

impl GeomCommandState {
    pub fn new(group_name: impl Into<String>, dim_new_group: Dim) -> Self {
        Self {
            group_name: group_name.into(),
            dim_new_group,
            created: Vec::new(),
            created_set: BTreeSet::new(),
            mementos: BTreeMap::new(),
        }
    }

    /// 清除上一次执行的结果
    pub fn reset(&mut self) {
        self.created.clear();
        self.created_set.clear();
        self.mementos.clear();
    }

    pub fn created(&self) -> &[EntityId] {
        &self.created
    }

    pub fn is_created(&self, id: EntityId) -> bool {
        self.created_set.contains(&id)
    }

    pub fn nb_mementos(&self) -> usize {
        self.mementos.len()
    }

    /// 交换备忘录与当前形状，连续两次调用恢复原状
    pub fn perm_mementos(&mut self, geom: &mut crate::geom_manager::GeomManager) -> Result<()> {
        for (id, shape) in self.mementos.iter_mut() {
            geom.swap_shape(*id, shape)?;
        }
        Ok(())
    }
}

/// 草图节点的引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftRef {
    /// 草图中的新节点
    New(usize),
    /// 已存在的实体
    Existing(EntityId),
}

/// 草图节点
#[derive(Debug, Clone)]
pub enum DraftNode {
    Vertex(Point3),
    Curve {
        points: Vec<Point3>,
        vertices: Vec<DraftRef>,
    },
    Surface(Vec<DraftRef>),
    Volume(Vec<DraftRef>),
}

impl DraftNode {
    fn dim(&self) -> Dim {
        match self {
            DraftNode::Vertex(_) => Dim::Vertex,
            DraftNode::Curve { .. } => Dim::Curve,
            DraftNode::Surface(_) => Dim::Surface,
            DraftNode::Volume(_) => Dim::Volume,
        }
    }

    fn children(&self) -> &[DraftRef] {
        match self {
            DraftNode::Vertex(_) => &[],
            DraftNode::Curve { vertices, .. } => vertices,
            DraftNode::Surface(curves) => curves,
            DraftNode::Volume(surfaces) => surfaces,
        }
    }
}

/// 尚未保存的实体草图，最后添加的节点为根
#[derive(Debug, Clone, Default)]
pub struct ShapeDraft {
    nodes: Vec<DraftNode>,
}

impl ShapeDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: DraftNode) -> DraftRef {
        self.nodes.push(node);
        DraftRef::New(self.nodes.len() - 1)
    }

    pub fn vertex(&mut self, point: Point3) -> DraftRef {
        self.add(DraftNode::Vertex(point))
    }

    /// 折线曲线，首尾顶点相同时为闭合曲线
    pub fn curve(&mut self, points: Vec<Point3>, start: DraftRef, end: DraftRef) -> DraftRef {
        let vertices = if start == end { vec![start] } else { vec![start, end] };
        self.add(DraftNode::Curve { points, vertices })
    }

    pub fn surface(&mut self, curves: Vec<DraftRef>) -> DraftRef {
        self.add(DraftNode::Surface(curves))
    }

    pub fn volume(&mut self, surfaces: Vec<DraftRef>) -> DraftRef {
        self.add(DraftNode::Volume(surfaces))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// 草图保存后的实体
#[derive(Debug, Clone)]
pub struct Materialized {
    ids: Vec<EntityId>,
}

impl Materialized {
    /// 引用对应的实体
    pub fn get(&self, draft: DraftRef) -> Option<EntityId> {
        match draft {
            DraftRef::New(i) => self.ids.get(i).copied(),
            DraftRef::Existing(id) => Some(id),
        }
    }

    /// 根实体
    pub fn root(&self) -> Option<EntityId> {
        self.ids.last().copied()
    }

    /// 草图节点对应的所有新实体，按节点顺序
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }
}

/// 命令执行期间对上下文的访问
pub struct GeomScope<'a> {
    pub ctx: &'a mut Context,
    pub info: &'a mut InfoCommand,
    pub state: &'a mut GeomCommandState,
}

impl<'a> GeomScope<'a> {
    pub fn new(
        ctx: &'a mut Context,
        info: &'a mut InfoCommand,
        state: &'a mut GeomCommandState,
    ) -> Self {
        Self { ctx, info, state }
    }

    pub fn tolerance(&self) -> f64 {
        self.ctx.tolerance()
    }

    /// 保存已有实体的形状，只保存第一次
    pub fn save_memento(&mut self, id: EntityId) -> Result<()> {
        if self.state.created_set.contains(&id) || self.state.mementos.contains_key(&id) {
            return Ok(());
        }
        let shape = self.ctx.geom.entity(id)?.shape.clone();
        self.state.mementos.insert(id, shape);
        Ok(())
    }

    /// 保存新实体，链接到形状中列出的邻居
    pub fn store(&mut self, shape: Shape) -> Result<EntityId> {
        let dim = shape.dim();
        let neighbours: Vec<EntityId> = shape
            .lower()
            .iter()
            .chain(shape.upper())
            .copied()
            .collect();
        for neighbour in &neighbours {
            self.save_memento(*neighbour)?;
        }

        let (id, name) = self.ctx.names.allocate(dim);
        debug!("Store {} {} ({})", dim, name, id);
        self.ctx.geom.add_entity(GeomEntity::new(id, name, shape))?;
        for neighbour in neighbours {
            self.ctx.geom.entity_mut(neighbour)?.shape.add_adjacent(dim, id);
        }

        self.info.add_geom_info_entity(id, dim, ChangeKind::Created);
        self.state.created.push(id);
        self.state.created_set.insert(id);
        Ok(id)
    }

    pub fn store_vertex(&mut self, point: Point3) -> Result<EntityId> {
        self.store(Shape::Vertex(Vertex {
            point,
            curves: Vec::new(),
        }))
    }

    /// 保存折线曲线，`vertices[0]` 对应首点
    pub fn store_curve(&mut self, points: Vec<Point3>, vertices: Vec<EntityId>) -> Result<EntityId> {
        self.store(Shape::Curve(Curve {
            points,
            vertices,
            surfaces: Vec::new(),
        }))
    }

    /// 连接两个顶点的线段
    pub fn store_segment(&mut self, start: EntityId, end: EntityId) -> Result<EntityId> {
        let points = vec![self.ctx.geom.point(start)?, self.ctx.geom.point(end)?];
        self.store_curve(points, vec![start, end])
    }

    pub fn store_surface(&mut self, curves: Vec<EntityId>) -> Result<EntityId> {
        self.store(Shape::Surface(Surface {
            curves,
            volumes: Vec::new(),
        }))
    }

    pub fn store_volume(&mut self, surfaces: Vec<EntityId>) -> Result<EntityId> {
        self.store(Shape::Volume(Volume { surfaces }))
    }

    /// 保存草图中的所有节点，不加入分组
    pub fn materialize(&mut self, draft: &ShapeDraft) -> Result<Materialized> {
        let mut ids: Vec<Option<EntityId>> = vec![None; draft.nodes.len()];
        for index in (0..draft.nodes.len()).rev() {
            self.realize(draft, index, &mut ids, 0)?;
        }
        let ids = ids
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CommandError::Internal("draft node left unsaved".to_string()))?;
        Ok(Materialized { ids })
    }

    /// 从高维到低维递归保存，低维节点先于引用它的节点保存
    fn realize(
        &mut self,
        draft: &ShapeDraft,
        index: usize,
        ids: &mut Vec<Option<EntityId>>,
        depth: usize,
    ) -> Result<EntityId> {
        if let Some(id) = ids[index] {
            return Ok(id);
        }
        if depth > draft.nodes.len() {
            return Err(CommandError::Internal("cyclic shape draft".to_string()));
        }
        let node = &draft.nodes[index];

        let mut lower = Vec::with_capacity(node.children().len());
        for child in node.children() {
            let id = match *child {
                DraftRef::New(j) if j < draft.nodes.len() => self.realize(draft, j, ids, depth + 1)?,
                DraftRef::New(j) => {
                    return Err(CommandError::Internal(format!("draft node {j} does not exist")))
                }
                DraftRef::Existing(id) => id,
            };
            let child_dim = self.ctx.geom.entity(id)?.dim();
            if child_dim.upper() != Some(node.dim()) {
                return Err(CommandError::WrongDimension {
                    id,
                    expected: node.dim().lower().unwrap_or(Dim::Vertex),
                    actual: child_dim,
                });
            }
            lower.push(id);
        }

        let shape = match node {
            DraftNode::Vertex(point) => Shape::Vertex(Vertex {
                point: *point,
                curves: Vec::new(),
            }),
            DraftNode::Curve { points, .. } => Shape::Curve(Curve {
                points: points.clone(),
                vertices: lower,
                surfaces: Vec::new(),
            }),
            DraftNode::Surface(_) => Shape::Surface(Surface {
                curves: lower,
                volumes: Vec::new(),
            }),
            DraftNode::Volume(_) => Shape::Volume(Volume { surfaces: lower }),
        };
        let id = self.store(shape)?;
        ids[index] = Some(id);
        Ok(id)
    }

    /// 保存草图并分组：根实体进入命令分组，其余新实体进入默认分组
    pub fn split(&mut self, draft: &ShapeDraft) -> Result<Materialized> {
        let materialized = self.materialize(draft)?;
        let Some(root) = materialized.root() else {
            return Ok(materialized);
        };
        for id in materialized.ids() {
            if *id != root {
                self.add_to_group(*id, true)?;
            }
        }
        self.add_to_group(root, false)?;
        Ok(materialized)
    }

    /// 分组操作
    pub fn group_helper(&mut self) -> GroupHelper<'_> {
        self.ctx.group_helper(self.info)
    }

    /// 加入分组：维度为 `dim_new_group` 且未要求默认分组时使用命令分组
    pub fn add_to_group(&mut self, id: EntityId, use_default: bool) -> Result<()> {
        let dim = self.ctx.geom.entity(id)?.dim();
        let name = if !use_default && dim == self.state.dim_new_group {
            self.state.group_name.clone()
        } else {
            String::new()
        };
        self.group_helper().add_to_group(id, &name)?;
        Ok(())
    }

    /// 把不属于任何分组的实体放入默认分组
    pub fn ensure_grouped(&mut self, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            let entity = self.ctx.geom.entity(*id)?;
            if !entity.destroyed && entity.groups.is_empty() {
                self.group_helper().add_to_group(*id, "")?;
            }
        }
        Ok(())
    }

    /// 建立邻接
    pub fn link(&mut self, a: EntityId, b: EntityId) -> Result<()> {
        self.save_memento(a)?;
        self.save_memento(b)?;
        self.ctx.geom.link(a, b)
    }

    /// 用新的低维实体替换 `entity` 边界中的 `old`，保持位置
    pub fn replace_lower(&mut self, entity: EntityId, old: EntityId, new: &[EntityId]) -> Result<()> {
        self.save_memento(entity)?;
        self.save_memento(old)?;
        let dim = self.ctx.geom.entity(entity)?.dim();
        self.ctx.geom.entity_mut(entity)?.shape.replace_lower(old, new);
        self.ctx.geom.entity_mut(old)?.shape.remove_adjacent(entity);
        for id in new {
            self.save_memento(*id)?;
            self.ctx.geom.entity_mut(*id)?.shape.add_adjacent(dim, entity);
        }
        Ok(())
    }

    /// 作废已有实体并修复邻居的邻接表
    pub fn set_destroy(&mut self, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            if self.state.created_set.contains(id) {
                return Err(CommandError::Internal(format!(
                    "entity {} was created by the running command",
                    self.ctx.geom.name_of(*id)
                )));
            }
            self.save_memento(*id)?;
            let entity = self.ctx.geom.entity(*id)?;
            let neighbours: Vec<EntityId> = entity
                .shape
                .lower()
                .iter()
                .chain(entity.shape.upper())
                .copied()
                .collect();
            for neighbour in neighbours {
                self.save_memento(neighbour)?;
            }
        }
        self.info
            .set_destroy_and_update_connectivity(&mut self.ctx.geom, ids)
    }

    /// 在记录中标记实体的修改
    pub fn mark(&mut self, id: EntityId, kind: ChangeKind) -> Result<()> {
        let dim = self.ctx.geom.entity(id)?.dim();
        self.info.add_geom_info_entity(id, dim, kind);
        Ok(())
    }
}

/// 构造类几何操作
pub trait GeomOperation: Send {
    /// 命令名称
    fn name(&self) -> &'static str;

    /// 使用命令分组的实体维度
    fn dim_new_group(&self) -> Dim {
        Dim::Volume
    }

    /// 执行前检查参数，失败时不修改任何实体
    fn validate(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()>;
}

/// 构造命令：运行一个几何操作并记录它创建的实体
pub struct CommandCreateGeom<O> {
    core: CommandCore,
    state: GeomCommandState,
    op: O,
}

impl<O: GeomOperation> CommandCreateGeom<O> {
    /// 校验参数后创建命令
    pub fn with_operation(ctx: &Context, op: O, group_name: impl Into<String>) -> Result<Self> {
        op.validate(ctx)?;
        Ok(Self {
            core: CommandCore::new(op.name()),
            state: GeomCommandState::new(group_name, op.dim_new_group()),
            op,
        })
    }

    pub fn operation(&self) -> &O {
        &self.op
    }

    pub fn group_name(&self) -> &str {
        &self.state.group_name
    }

    /// 最近一次执行新建的实体
    pub fn created_entities(&self) -> &[EntityId] {
        self.state.created()
    }

    pub fn state(&self) -> &GeomCommandState {
        &self.state
    }
}

/// 几何命令共用的撤销/重做/回滚步骤
pub(crate) fn geom_undo(
    core: &mut CommandCore,
    state: &mut GeomCommandState,
    ctx: &mut Context,
) -> Result<()> {
    if !core.is_preview_mode() {
        ctx.kernel.undo()?;
    }
    state.perm_mementos(&mut ctx.geom)?;
    core.info.perm_created_deleted(&mut ctx.geom, &mut ctx.groups)
}

pub(crate) fn geom_redo(
    core: &mut CommandCore,
    state: &mut GeomCommandState,
    ctx: &mut Context,
) -> Result<()> {
    ctx.kernel.redo()?;
    state.perm_mementos(&mut ctx.geom)?;
    core.info.perm_created_deleted(&mut ctx.geom, &mut ctx.groups)
}

pub(crate) fn geom_rollback(
    core: &mut CommandCore,
    state: &mut GeomCommandState,
    ctx: &mut Context,
) {
    if let Err(err) = state.perm_mementos(&mut ctx.geom) {
        error!("rollback of {}: {}", core.unique_name(), err);
    }
    rollback_ledger(&mut core.info, ctx);
    state.reset();
}

impl<O: GeomOperation> Command for CommandCreateGeom<O> {
    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore {
        &mut self.core
    }

    fn internal_execute(&mut self, ctx: &mut Context) -> Result<()> {
        self.state.reset();
        let mut scope = GeomScope::new(ctx, &mut self.core.info, &mut self.state);
        self.op.execute(&mut scope)?;
        let created = scope.state.created().to_vec();
        scope.ensure_grouped(&created)
    }

    fn rollback(&mut self, ctx: &mut Context) {
        geom_rollback(&mut self.core, &mut self.state, ctx);
    }

    fn internal_undo(&mut self, ctx: &mut Context) -> Result<()> {
        geom_undo(&mut self.core, &mut self.state, ctx)
    }

    fn internal_redo(&mut self, ctx: &mut Context) -> Result<()> {
        geom_redo(&mut self.core, &mut self.state, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandStatus;
    use crate::group::GroupManager;

    /// 在已有顶点上建一条线段，再按参数失败
    struct Bridge {
        a: EntityId,
        b: EntityId,
        fail: bool,
    }

    impl GeomOperation for Bridge {
        fn name(&self) -> &'static str {
            "Bridge"
        }

        fn dim_new_group(&self) -> Dim {
            Dim::Curve
        }

        fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
            let c = scope.store_segment(self.a, self.b)?;
            scope.add_to_group(c, false)?;
            if self.fail {
                return Err(CommandError::Execution("bridge collapsed".to_string()));
            }
            Ok(())
        }
    }

    /// 两个已有顶点
    fn two_vertices(ctx: &mut Context) -> (EntityId, EntityId) {
        let mut info = InfoCommand::new();
        let mut state = GeomCommandState::new("", Dim::Vertex);
        let mut scope = GeomScope::new(ctx, &mut info, &mut state);
        let a = scope.store_vertex(Point3::origin()).unwrap();
        let b = scope.store_vertex(Point3::new(2.0, 0.0, 0.0)).unwrap();
        scope.ensure_grouped(&[a, b]).unwrap();
        (a, b)
    }

    #[test]
    fn test_split_stores_each_entity_once() {
        let mut ctx = Context::new();
        let mut info = InfoCommand::new();
        let mut state = GeomCommandState::new("Faces", Dim::Surface);
        let mut scope = GeomScope::new(&mut ctx, &mut info, &mut state);

        let mut draft = ShapeDraft::new();
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let v: Vec<DraftRef> = p.iter().map(|p| draft.vertex(*p)).collect();
        let c: Vec<DraftRef> = (0..3)
            .map(|i| draft.curve(vec![p[i], p[(i + 1) % 3]], v[i], v[(i + 1) % 3]))
            .collect();
        draft.surface(c);

        let result = scope.split(&draft).unwrap();
        let root = result.root().unwrap();
        assert_eq!(scope.state.created().len(), 7);
        assert_eq!(scope.ctx.geom.nb(Dim::Vertex), 3);
        assert_eq!(scope.ctx.geom.surface_vertex_loop(root).unwrap().len(), 3);

        let names = scope.group_helper().group_names(root).unwrap();
        assert_eq!(names, vec!["Faces"]);
        let curve = result.get(DraftRef::New(3)).unwrap();
        assert_eq!(
            scope.group_helper().group_names(curve).unwrap(),
            vec![GroupManager::default_name(Dim::Curve)]
        );
        assert_eq!(info.entities_with(ChangeKind::Created).len(), 7);
    }

    #[test]
    fn test_draft_rejects_wrong_dimension() {
        let mut ctx = Context::new();
        let mut info = InfoCommand::new();
        let mut state = GeomCommandState::new("", Dim::Volume);
        let mut scope = GeomScope::new(&mut ctx, &mut info, &mut state);

        let mut draft = ShapeDraft::new();
        let v = draft.vertex(Point3::origin());
        draft.surface(vec![v]);
        assert!(matches!(
            scope.materialize(&draft),
            Err(CommandError::WrongDimension { .. })
        ));
    }

    #[test]
    fn test_create_undo_restores_neighbours() {
        let mut ctx = Context::new();
        let (a, b) = two_vertices(&mut ctx);

        let op = Bridge { a, b, fail: false };
        let mut cmd = CommandCreateGeom::with_operation(&ctx, op, "Bridges").unwrap();
        cmd.execute(&mut ctx).unwrap();
        let c = cmd.created_entities()[0];
        assert_eq!(ctx.geom.vertex(a).unwrap().curves, vec![c]);
        assert_eq!(cmd.state().nb_mementos(), 2);

        cmd.undo(&mut ctx).unwrap();
        assert!(ctx.geom.vertex(a).unwrap().curves.is_empty());
        assert!(ctx.geom.curves().is_empty());
        assert!(ctx.groups.get_group(Dim::Curve, "Bridges", false).unwrap().is_none());

        cmd.redo(&mut ctx).unwrap();
        assert_eq!(ctx.geom.vertex(b).unwrap().curves, vec![c]);
        assert_eq!(ctx.geom.curves(), vec![c]);
    }

    #[test]
    fn test_failed_create_leaves_no_trace() {
        let mut ctx = Context::new();
        let (a, b) = two_vertices(&mut ctx);
        let stored = ctx.geom.nb_stored();
        let next = ctx.names.next_id();

        let op = Bridge { a, b, fail: true };
        let mut cmd = CommandCreateGeom::with_operation(&ctx, op, "Bridges").unwrap();
        assert!(cmd.execute(&mut ctx).is_err());
        assert_eq!(cmd.status(), CommandStatus::Canceled);
        assert_eq!(ctx.geom.nb_stored(), stored);
        assert_eq!(ctx.names.next_id(), next);
        assert!(ctx.geom.vertex(a).unwrap().curves.is_empty());
        assert!(ctx.groups.get_group(Dim::Curve, "Bridges", false).unwrap().is_none());
        assert!(cmd.created_entities().is_empty());
    }

    #[test]
    fn test_preview_objects_then_execute() {
        let mut ctx = Context::new();
        let (a, b) = two_vertices(&mut ctx);
        let next = ctx.names.next_id();

        let op = Bridge { a, b, fail: false };
        let mut cmd = CommandCreateGeom::with_operation(&ctx, op, "").unwrap();
        let rep = cmd.preview_new_objects(&mut ctx).unwrap();
        assert_eq!(rep.nb_segments(), 1);
        assert!(ctx.geom.curves().is_empty());
        assert!(ctx.geom.vertex(a).unwrap().curves.is_empty());
        assert_eq!(ctx.names.next_id(), next);

        cmd.execute(&mut ctx).unwrap();
        assert_eq!(cmd.created_entities(), &[next]);
    }
}
