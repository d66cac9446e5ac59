//! 棱柱：沿向量平移曲面，生成以原曲面为底的体
//!
//! 连接关系表：
//! - `v2v`/`c2c`/`s2s`: 底面实体到顶面对应实体
//! - `v2c`: 顶点到它扫出的侧边
//! - `c2s`: 曲线到它扫出的侧面
//! - `s2v`: 曲面到它生成的体
//!
//! 多个曲面共享的边界曲线只生成一次侧面，共享的顶点只生成一次侧边。

use super::{check_live, check_vector};
use crate::command::create_geom::{CommandCreateGeom, GeomOperation, GeomScope};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use crate::group::DefaultGroupPolicy;
use crate::math::Vector3;
use std::collections::BTreeMap;

/// 棱柱操作
#[derive(Debug, Clone)]
pub struct PrismOperation {
    pub surfaces: Vec<EntityId>,
    pub vector: Vector3,

    pub v2v: BTreeMap<EntityId, EntityId>,
    pub v2c: BTreeMap<EntityId, EntityId>,
    pub c2c: BTreeMap<EntityId, EntityId>,
    pub c2s: BTreeMap<EntityId, EntityId>,
    pub s2s: BTreeMap<EntityId, EntityId>,
    pub s2v: BTreeMap<EntityId, EntityId>,
}

impl PrismOperation {
    pub fn new(surfaces: Vec<EntityId>, vector: Vector3) -> Self {
        Self {
            surfaces,
            vector,
            v2v: BTreeMap::new(),
            v2c: BTreeMap::new(),
            c2c: BTreeMap::new(),
            c2s: BTreeMap::new(),
            s2s: BTreeMap::new(),
            s2v: BTreeMap::new(),
        }
    }

    fn clear_maps(&mut self) {
        self.v2v.clear();
        self.v2c.clear();
        self.c2c.clear();
        self.c2s.clear();
        self.s2s.clear();
        self.s2v.clear();
    }

    /// 顶点的平移副本和侧边
    fn sweep_vertex(&mut self, scope: &mut GeomScope<'_>, vertex: EntityId) -> Result<()> {
        if self.v2v.contains_key(&vertex) {
            return Ok(());
        }
        let point = scope.ctx.geom.point(vertex)?;
        let top = scope.store_vertex(point + self.vector)?;
        let side = scope.store_curve(vec![point, point + self.vector], vec![vertex, top])?;
        self.v2v.insert(vertex, top);
        self.v2c.insert(vertex, side);
        Ok(())
    }

    /// 曲线的平移副本和侧面
    fn sweep_curve(&mut self, scope: &mut GeomScope<'_>, curve: EntityId) -> Result<()> {
        if self.c2c.contains_key(&curve) {
            return Ok(());
        }
        let c = scope.ctx.geom.curve(curve)?.clone();
        let (a, b) = match c.vertices.as_slice() {
            [a, b] => (*a, *b),
            _ => {
                return Err(CommandError::Execution(format!(
                    "curve {} is closed",
                    scope.ctx.geom.name_of(curve)
                )))
            }
        };
        self.sweep_vertex(scope, a)?;
        self.sweep_vertex(scope, b)?;

        let points = c.points.iter().map(|p| p + self.vector).collect();
        let top = scope.store_curve(points, vec![self.v2v[&a], self.v2v[&b]])?;
        let side = scope.store_surface(vec![curve, self.v2c[&b], top, self.v2c[&a]])?;
        self.c2c.insert(curve, top);
        self.c2s.insert(curve, side);
        Ok(())
    }
}

impl GeomOperation for PrismOperation {
    fn name(&self) -> &'static str {
        "NewPrism"
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        check_vector(&self.vector, ctx.tolerance())?;
        if self.surfaces.is_empty() {
            return Err(CommandError::Validation("no surface selected".to_string()));
        }
        for s in &self.surfaces {
            check_live(ctx, *s, Dim::Surface)?;
            if !ctx.geom.live_upper(*s)?.is_empty() {
                return Err(CommandError::Validation(format!(
                    "surface {} already bounds a volume",
                    ctx.geom.name_of(*s)
                )));
            }
            for c in &ctx.geom.surface(*s)?.curves {
                if ctx.geom.curve(*c)?.is_closed() {
                    return Err(CommandError::Validation(format!(
                        "surface {} is bounded by the closed curve {}",
                        ctx.geom.name_of(*s),
                        ctx.geom.name_of(*c)
                    )));
                }
            }
            ctx.geom.surface_vertex_loop(*s)?;
        }
        Ok(())
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        self.clear_maps();

        for s in self.surfaces.clone() {
            let curves = scope.ctx.geom.surface(s)?.curves.clone();
            for c in &curves {
                self.sweep_curve(scope, *c)?;
            }
            let top_curves = curves.iter().map(|c| self.c2c[c]).collect();
            let top = scope.store_surface(top_curves)?;

            let mut faces = vec![s];
            faces.extend(curves.iter().map(|c| self.c2s[c]));
            faces.push(top);
            let volume = scope.store_volume(faces)?;
            self.s2s.insert(s, top);
            self.s2v.insert(s, volume);
        }

        let s2v: Vec<(EntityId, EntityId)> = self.s2v.iter().map(|(k, v)| (*k, *v)).collect();
        let c2s: Vec<(EntityId, EntityId)> = self.c2s.iter().map(|(k, v)| (*k, *v)).collect();
        let v2c: Vec<(EntityId, EntityId)> = self.v2c.iter().map(|(k, v)| (*k, *v)).collect();
        {
            let mut helper = scope.group_helper();
            helper.groups_to_upper_dim(&s2v, DefaultGroupPolicy::Translate)?;
            helper.groups_to_upper_dim(&c2s, DefaultGroupPolicy::Translate)?;
            helper.groups_to_upper_dim(&v2c, DefaultGroupPolicy::Translate)?;
        }

        let named = !scope.state.group_name.is_empty();
        for (_, volume) in s2v {
            if named || scope.ctx.geom.entity(volume)?.groups.is_empty() {
                scope.add_to_group(volume, false)?;
            }
        }
        Ok(())
    }
}

pub type CommandNewPrism = CommandCreateGeom<PrismOperation>;

impl CommandNewPrism {
    pub fn new(
        ctx: &Context,
        surfaces: Vec<EntityId>,
        vector: Vector3,
        group_name: impl Into<String>,
    ) -> Result<Self> {
        Self::with_operation(ctx, PrismOperation::new(surfaces, vector), group_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::info_command::InfoCommand;
    use crate::math::Point3;
    use crate::ops::CommandNewPlanarSurface;

    fn square(ctx: &mut Context, x: f64, group: &str) -> EntityId {
        let points = vec![
            Point3::new(x, 0.0, 0.0),
            Point3::new(x + 1.0, 0.0, 0.0),
            Point3::new(x + 1.0, 1.0, 0.0),
            Point3::new(x, 1.0, 0.0),
        ];
        let mut cmd = CommandNewPlanarSurface::new(ctx, points, group).unwrap();
        cmd.execute(ctx).unwrap();
        *cmd.created_entities().last().unwrap()
    }

    #[test]
    fn test_prism_topology() {
        let mut ctx = Context::new();
        let s = square(&mut ctx, 0.0, "");
        let mut cmd = CommandNewPrism::new(&ctx, vec![s], Vector3::new(0.0, 0.0, 2.0), "").unwrap();
        cmd.execute(&mut ctx).unwrap();

        assert_eq!(ctx.geom.nb(Dim::Volume), 1);
        assert_eq!(ctx.geom.nb(Dim::Surface), 6);
        assert_eq!(ctx.geom.nb(Dim::Curve), 12);
        assert_eq!(ctx.geom.nb(Dim::Vertex), 8);
        for face in ctx.geom.surfaces() {
            assert_eq!(ctx.geom.surface_vertex_loop(face).unwrap().len(), 4);
        }
        let op = cmd.operation();
        let vol = op.s2v[&s];
        assert_eq!(ctx.geom.live_upper(s).unwrap(), vec![vol]);
        let bbox = ctx.geom.bounding_box(vol).unwrap();
        assert_eq!(bbox.max.z, 2.0);

        let names = ctx.group_helper(&mut InfoCommand::new()).group_names(vol).unwrap();
        assert_eq!(names, vec!["Hors Groupe 3D"]);
        let side = op.c2s.values().next().copied().unwrap();
        let names = ctx.group_helper(&mut InfoCommand::new()).group_names(side).unwrap();
        assert_eq!(names, vec!["Hors Groupe 2D"]);

        // 已经是体的边界
        assert!(CommandNewPrism::new(&ctx, vec![s], Vector3::z(), "").is_err());
    }

    #[test]
    fn test_prism_undo_redo() {
        let mut ctx = Context::new();
        let a = square(&mut ctx, 0.0, "");
        let mut cmd = CommandNewPrism::new(&ctx, vec![a], Vector3::z(), "").unwrap();
        cmd.execute(&mut ctx).unwrap();
        cmd.undo(&mut ctx).unwrap();
        assert_eq!(ctx.geom.nb(Dim::Volume), 0);
        assert!(ctx.geom.live_upper(a).unwrap().is_empty());
        assert_eq!(ctx.geom.nb(Dim::Surface), 1);

        cmd.redo(&mut ctx).unwrap();
        assert_eq!(ctx.geom.nb(Dim::Volume), 1);
        assert_eq!(ctx.geom.live_upper(a).unwrap().len(), 1);
    }

    #[test]
    fn test_prism_named_group() {
        let mut ctx = Context::new();
        let s = square(&mut ctx, 0.0, "Base");
        let mut cmd = CommandNewPrism::new(&ctx, vec![s], Vector3::z(), "Solids").unwrap();
        cmd.execute(&mut ctx).unwrap();
        let vol = cmd.operation().s2v[&s];
        let names = ctx.group_helper(&mut InfoCommand::new()).group_names(vol).unwrap();
        assert_eq!(names, vec!["Base", "Solids"]);
    }

    #[test]
    fn test_prism_validation() {
        let mut ctx = Context::new();
        let s = square(&mut ctx, 0.0, "");
        assert!(matches!(
            CommandNewPrism::new(&ctx, vec![s], Vector3::zeros(), ""),
            Err(CommandError::Validation(_))
        ));
        assert!(CommandNewPrism::new(&ctx, vec![], Vector3::z(), "").is_err());
        let c = ctx.geom.curves()[0];
        assert!(matches!(
            CommandNewPrism::new(&ctx, vec![c], Vector3::z(), ""),
            Err(CommandError::WrongDimension { .. })
        ));
    }
}
