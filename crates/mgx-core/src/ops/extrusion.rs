//! 沿方向拉伸
//!
//! 先复制选中的实体及其边界（`v2v`、`c2c`、`s2s`），再把每个副本拉伸高一维：
//! 顶点扫出曲线，曲线扫出曲面，曲面扫出体。
//! 不保留原实体时，原实体被作废，它们的分组转移到副本上；
//! 保留原实体并给出副本前缀时，副本加入 `<前缀>_<原分组名>`，副本曲面另外加入前缀分组。

use super::check_vector;
use crate::command::create_geom::{CommandCreateGeom, GeomOperation, GeomScope};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use crate::group::DefaultGroupPolicy;
use crate::math::Vector3;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 拉伸操作
#[derive(Debug, Clone)]
pub struct ExtrusionOperation {
    pub entities: Vec<EntityId>,
    pub vector: Vector3,

    /// 是否保留原实体
    pub keep: bool,

    /// 保留原实体时副本分组名的前缀
    pub copy_prefix: Option<String>,

    /// 原实体到副本
    pub v2v: BTreeMap<EntityId, EntityId>,
    pub c2c: BTreeMap<EntityId, EntityId>,
    pub s2s: BTreeMap<EntityId, EntityId>,

    /// 副本到拉伸出的高一维实体
    pub v2c: BTreeMap<EntityId, EntityId>,
    pub c2s: BTreeMap<EntityId, EntityId>,
    pub s2v: BTreeMap<EntityId, EntityId>,

    /// 副本到拉伸后的对面实体
    pub v2v_opp: BTreeMap<EntityId, EntityId>,
    pub c2c_opp: BTreeMap<EntityId, EntityId>,
    pub s2s_opp: BTreeMap<EntityId, EntityId>,

    /// 选中实体的最高维度
    top_dim: Dim,
}

impl ExtrusionOperation {
    pub fn new(ctx: &Context, entities: Vec<EntityId>, vector: Vector3, keep: bool) -> Self {
        let top_dim = entities
            .iter()
            .filter_map(|id| ctx.geom.get(*id))
            .map(|e| e.dim())
            .max()
            .unwrap_or(Dim::Vertex);
        Self {
            entities,
            vector,
            keep,
            copy_prefix: None,
            v2v: BTreeMap::new(),
            c2c: BTreeMap::new(),
            s2s: BTreeMap::new(),
            v2c: BTreeMap::new(),
            c2s: BTreeMap::new(),
            s2v: BTreeMap::new(),
            v2v_opp: BTreeMap::new(),
            c2c_opp: BTreeMap::new(),
            s2s_opp: BTreeMap::new(),
            top_dim,
        }
    }

    pub fn with_copy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.copy_prefix = Some(prefix.into());
        self
    }

    fn clear_maps(&mut self) {
        for map in [
            &mut self.v2v,
            &mut self.c2c,
            &mut self.s2s,
            &mut self.v2c,
            &mut self.c2s,
            &mut self.s2v,
            &mut self.v2v_opp,
            &mut self.c2c_opp,
            &mut self.s2s_opp,
        ] {
            map.clear();
        }
    }

    /// 复制原实体，按维度从低到高
    fn copy_entities(&mut self, scope: &mut GeomScope<'_>, closure: &[EntityId]) -> Result<()> {
        for id in closure {
            let shape = scope.ctx.geom.entity(*id)?.shape.clone();
            match shape.dim() {
                Dim::Vertex => {
                    let point = scope.ctx.geom.point(*id)?;
                    let copy = scope.store_vertex(point)?;
                    self.v2v.insert(*id, copy);
                }
                Dim::Curve => {
                    let curve = scope.ctx.geom.curve(*id)?.clone();
                    let vertices = curve.vertices.iter().map(|v| self.v2v[v]).collect();
                    let copy = scope.store_curve(curve.points, vertices)?;
                    self.c2c.insert(*id, copy);
                }
                Dim::Surface => {
                    let curves = shape.lower().iter().map(|c| self.c2c[c]).collect();
                    let copy = scope.store_surface(curves)?;
                    self.s2s.insert(*id, copy);
                }
                Dim::Volume => {
                    return Err(CommandError::Internal(format!(
                        "volume {} cannot be extruded",
                        scope.ctx.geom.name_of(*id)
                    )))
                }
            }
        }
        Ok(())
    }

    /// 拉伸副本
    fn extrude_copies(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        for copy in self.v2v.values().copied().collect::<Vec<_>>() {
            let point = scope.ctx.geom.point(copy)?;
            let opposite = scope.store_vertex(point + self.vector)?;
            let side = scope.store_curve(vec![point, point + self.vector], vec![copy, opposite])?;
            self.v2v_opp.insert(copy, opposite);
            self.v2c.insert(copy, side);
        }

        for copy in self.c2c.values().copied().collect::<Vec<_>>() {
            let curve = scope.ctx.geom.curve(copy)?.clone();
            let points = curve.points.iter().map(|p| p + self.vector).collect();
            let vertices = curve.vertices.iter().map(|v| self.v2v_opp[v]).collect();
            let opposite = scope.store_curve(points, vertices)?;
            let side_curves = match curve.vertices.as_slice() {
                [a, b] => vec![copy, self.v2c[b], opposite, self.v2c[a]],
                _ => {
                    return Err(CommandError::Internal(format!(
                        "curve {} is not bounded by two vertices",
                        scope.ctx.geom.name_of(copy)
                    )))
                }
            };
            let side = scope.store_surface(side_curves)?;
            self.c2c_opp.insert(copy, opposite);
            self.c2s.insert(copy, side);
        }

        for copy in self.s2s.values().copied().collect::<Vec<_>>() {
            let curves = scope.ctx.geom.surface(copy)?.curves.clone();
            let opposite = scope.store_surface(curves.iter().map(|c| self.c2c_opp[c]).collect())?;
            let mut faces = vec![copy];
            faces.extend(curves.iter().map(|c| self.c2s[c]));
            faces.push(opposite);
            let volume = scope.store_volume(faces)?;
            self.s2s_opp.insert(copy, opposite);
            self.s2v.insert(copy, volume);
        }
        Ok(())
    }

    /// 原实体到拉伸结果
    fn extruded_pairs(&self) -> Vec<(EntityId, EntityId)> {
        let through = |copies: &BTreeMap<EntityId, EntityId>, extruded: &BTreeMap<EntityId, EntityId>| {
            copies
                .iter()
                .filter_map(|(orig, copy)| extruded.get(copy).map(|e| (*orig, *e)))
                .collect::<Vec<_>>()
        };
        let mut pairs = through(&self.v2v, &self.v2c);
        pairs.extend(through(&self.c2c, &self.c2s));
        pairs.extend(through(&self.s2s, &self.s2v));
        pairs
    }
}

/// 实体及其边界，按维度从低到高
fn closure_by_dim(ctx: &Context, entities: &[EntityId]) -> Result<Vec<EntityId>> {
    let closure = ctx.geom.downward_closure(entities)?;
    let mut ordered: Vec<EntityId> = closure.into_iter().collect();
    ordered.sort_by_key(|id| (ctx.geom.get(*id).map(|e| e.dim()), *id));
    Ok(ordered)
}

impl GeomOperation for ExtrusionOperation {
    fn name(&self) -> &'static str {
        "Extrusion"
    }

    fn dim_new_group(&self) -> Dim {
        self.top_dim.upper().unwrap_or(Dim::Volume)
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        check_vector(&self.vector, ctx.tolerance())?;
        if self.entities.is_empty() {
            return Err(CommandError::Validation("no entity selected".to_string()));
        }
        for id in &self.entities {
            let entity = ctx.geom.live(*id)?;
            if entity.dim() == Dim::Volume {
                return Err(CommandError::Validation(format!(
                    "volume {} cannot be extruded",
                    entity.name
                )));
            }
        }
        let closure: BTreeSet<EntityId> = closure_by_dim(ctx, &self.entities)?.into_iter().collect();
        for id in &closure {
            if ctx.geom.curve(*id).is_ok_and(|c| c.is_closed()) {
                return Err(CommandError::Validation(format!(
                    "closed curve {} cannot be extruded",
                    ctx.geom.name_of(*id)
                )));
            }
        }
        if !self.keep {
            for id in &closure {
                for upper in ctx.geom.live_upper(*id)? {
                    if !closure.contains(&upper) {
                        return Err(CommandError::Validation(format!(
                            "{} is shared with {} and cannot be discarded",
                            ctx.geom.name_of(*id),
                            ctx.geom.name_of(upper)
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        self.clear_maps();
        let closure = closure_by_dim(&*scope.ctx, &self.entities)?;
        self.copy_entities(scope, &closure)?;
        self.extrude_copies(scope)?;
        debug!(
            "Extrusion: {} copies, {} swept entities",
            self.v2v.len() + self.c2c.len() + self.s2s.len(),
            self.v2c.len() + self.c2s.len() + self.s2v.len()
        );

        // 新实体先进入默认分组
        let created = scope.state.created().to_vec();
        for id in &created {
            scope.add_to_group(*id, true)?;
        }

        let copies: Vec<(EntityId, EntityId)> = self
            .v2v
            .iter()
            .chain(&self.c2c)
            .chain(&self.s2s)
            .map(|(orig, copy)| (*orig, *copy))
            .collect();
        if !self.keep {
            {
                let mut helper = scope.group_helper();
                for (orig, copy) in &copies {
                    helper.copy_groups(*orig, *copy)?;
                }
            }
            scope.set_destroy(&closure)?;
        } else if let Some(prefix) = self.copy_prefix.as_deref().filter(|p| !p.is_empty()) {
            scope.group_helper().prefix_groups_name(prefix, &copies)?;
        }

        let pairs = self.extruded_pairs();
        scope
            .group_helper()
            .groups_to_upper_dim(&pairs, DefaultGroupPolicy::Skip)?;

        if !scope.state.group_name.is_empty() {
            let top_dim = self.dim_new_group();
            for (_, extruded) in &pairs {
                if scope.ctx.geom.entity(*extruded)?.dim() == top_dim {
                    scope.add_to_group(*extruded, false)?;
                }
            }
        }
        Ok(())
    }
}

pub type CommandExtrusion = CommandCreateGeom<ExtrusionOperation>;

impl CommandExtrusion {
    pub fn new(
        ctx: &Context,
        entities: Vec<EntityId>,
        vector: Vector3,
        keep: bool,
        group_name: impl Into<String>,
    ) -> Result<Self> {
        let op = ExtrusionOperation::new(ctx, entities, vector, keep);
        Self::with_operation(ctx, op, group_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::group::GroupManager;
    use crate::info_command::InfoCommand;
    use crate::math::Point3;
    use crate::ops::{CommandNewPlanarSurface, CommandNewPrism, CommandNewVertex};

    fn triangle(ctx: &mut Context, group: &str) -> EntityId {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mut cmd = CommandNewPlanarSurface::new(ctx, points, group).unwrap();
        cmd.execute(ctx).unwrap();
        *cmd.created_entities().last().unwrap()
    }

    fn names(ctx: &mut Context, id: EntityId) -> Vec<String> {
        ctx.group_helper(&mut InfoCommand::new()).group_names(id).unwrap()
    }

    #[test]
    fn test_extrude_vertex() {
        let mut ctx = Context::new();
        let mut v = CommandNewVertex::new(&ctx, Point3::origin(), "Anchors").unwrap();
        v.execute(&mut ctx).unwrap();
        let v = v.created_entities()[0];

        let mut cmd = CommandExtrusion::new(&ctx, vec![v], Vector3::x(), true, "").unwrap();
        cmd.execute(&mut ctx).unwrap();
        assert_eq!(ctx.geom.nb(Dim::Vertex), 3);
        assert_eq!(ctx.geom.nb(Dim::Curve), 1);

        let op = cmd.operation();
        let copy = op.v2v[&v];
        let curve = op.v2c[&copy];
        assert_eq!(ctx.geom.curve(curve).unwrap().points[1], Point3::new(1.0, 0.0, 0.0));
        // 非默认分组传递到高一维
        assert_eq!(names(&mut ctx, curve), vec!["Anchors"]);
        assert_eq!(names(&mut ctx, copy), vec![GroupManager::default_name(Dim::Vertex)]);
    }

    #[test]
    fn test_extrude_surface_without_keep() {
        let mut ctx = Context::new();
        let s = triangle(&mut ctx, "Walls");

        let mut cmd = CommandExtrusion::new(&ctx, vec![s], Vector3::z(), false, "Solids").unwrap();
        cmd.execute(&mut ctx).unwrap();

        // 原三角形被副本替换
        assert!(!ctx.geom.is_live(s));
        assert_eq!(ctx.geom.nb(Dim::Volume), 1);
        assert_eq!(ctx.geom.nb(Dim::Surface), 5);
        assert_eq!(ctx.geom.nb(Dim::Curve), 9);
        assert_eq!(ctx.geom.nb(Dim::Vertex), 6);

        let op = cmd.operation();
        let copy = op.s2s[&s];
        let vol = op.s2v[&copy];
        assert_eq!(names(&mut ctx, copy), vec!["Walls"]);
        assert_eq!(names(&mut ctx, vol), vec!["Walls", "Solids"]);

        cmd.undo(&mut ctx).unwrap();
        assert!(ctx.geom.is_live(s));
        assert_eq!(ctx.geom.nb(Dim::Surface), 1);
        assert_eq!(ctx.geom.nb(Dim::Curve), 3);
        for c in ctx.geom.surface(s).unwrap().curves.clone() {
            assert_eq!(ctx.geom.curve(c).unwrap().surfaces, vec![s]);
        }
    }

    #[test]
    fn test_extrude_keep_duplicates_base() {
        let mut ctx = Context::new();
        let s = triangle(&mut ctx, "");
        let mut cmd = CommandExtrusion::new(&ctx, vec![s], Vector3::z(), true, "").unwrap();
        cmd.execute(&mut ctx).unwrap();
        assert!(ctx.geom.is_live(s));
        assert_eq!(ctx.geom.nb(Dim::Surface), 6);
        let vol = ctx.geom.volumes()[0];
        assert_eq!(names(&mut ctx, vol), vec![GroupManager::default_name(Dim::Volume)]);
    }

    #[test]
    fn test_extrude_keep_with_copy_prefix() {
        let mut ctx = Context::new();
        let s = triangle(&mut ctx, "Walls");
        let op = ExtrusionOperation::new(&ctx, vec![s], Vector3::z(), true).with_copy_prefix("Sym");
        let mut cmd = CommandExtrusion::with_operation(&ctx, op, "").unwrap();
        cmd.execute(&mut ctx).unwrap();

        let op = cmd.operation();
        let copy = op.s2s[&s];
        assert_eq!(names(&mut ctx, copy), vec!["Sym_Walls", "Sym"]);
        assert_eq!(names(&mut ctx, s), vec!["Walls"]);
        let edge = ctx.geom.surface(s).unwrap().curves[0];
        assert_eq!(names(&mut ctx, op.c2c[&edge]), vec!["Sym_Hors Groupe 1D"]);
    }

    #[test]
    fn test_shared_entities_cannot_be_discarded() {
        let mut ctx = Context::new();
        let s = triangle(&mut ctx, "");
        let c = ctx.geom.surface(s).unwrap().curves[0];
        assert!(matches!(
            CommandExtrusion::new(&ctx, vec![c], Vector3::z(), false, ""),
            Err(CommandError::Validation(_))
        ));
        assert!(CommandExtrusion::new(&ctx, vec![c], Vector3::z(), true, "").is_ok());

        let mut prism = CommandNewPrism::new(&ctx, vec![s], Vector3::z(), "").unwrap();
        prism.execute(&mut ctx).unwrap();
        let vol = ctx.geom.volumes()[0];
        assert!(CommandExtrusion::new(&ctx, vec![vol], Vector3::z(), true, "").is_err());
    }
}
