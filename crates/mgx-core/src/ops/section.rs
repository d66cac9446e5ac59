//! 平面剖切：用一个平面把曲面或体切成两部分
//!
//! 被切的曲线在交点处一分为二；曲面沿两个交点之间的截线切开，
//! 体由切开的面、未切的面和截面封盖组成两半。
//! 只支持凸的曲面：一个曲面与平面最多有两个交点。
//!
//! 截线（曲面模式）或截面（体模式）进入命令分组，
//! 新的顶点进入默认分组，其余新实体继承被替换实体的分组。

use super::check_live;
use crate::command::create_geom::GeomScope;
use crate::command::edit_geom::{CommandEditGeom, EditOperation, GeomModification};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use crate::geom_manager::GeomManager;
use crate::math::{Plane, Point3};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 被切开的曲线：交点处的新顶点和两段新曲线
///
/// `pieces[0]` 从原曲线的第一个端点出发。
#[derive(Debug, Clone, Copy)]
struct CurveSplit {
    vertex: EntityId,
    pieces: [EntityId; 2],
}

/// 被切开的曲面
#[derive(Debug, Clone, Copy)]
struct SurfaceSplit {
    positive: EntityId,
    negative: EntityId,
    section: EntityId,
}

/// 平面剖切操作
#[derive(Debug, Clone)]
pub struct SectionByPlaneOperation {
    pub entities: Vec<EntityId>,
    pub plane: Plane,

    /// 被切的是曲面还是体
    mode: Dim,

    /// 可以被切开的曲面
    allowed: BTreeSet<EntityId>,
    curve_cuts: BTreeMap<EntityId, Option<CurveSplit>>,
    surface_cuts: BTreeMap<EntityId, Option<SurfaceSplit>>,

    /// 交点处新建的顶点
    pub new_vertices: Vec<EntityId>,

    /// 曲面上的截线
    pub section_curves: Vec<EntityId>,

    /// 体的截面
    pub caps: Vec<EntityId>,

    /// 被切开的实体到 (正侧部分, 负侧部分)
    pub halves: BTreeMap<EntityId, (EntityId, EntityId)>,

    modification: GeomModification,
}

impl SectionByPlaneOperation {
    pub fn new(ctx: &Context, entities: Vec<EntityId>, plane: Plane) -> Self {
        let mode = entities
            .first()
            .and_then(|id| ctx.geom.get(*id))
            .map(|e| e.dim())
            .unwrap_or(Dim::Surface);
        Self {
            entities,
            plane,
            mode,
            allowed: BTreeSet::new(),
            curve_cuts: BTreeMap::new(),
            surface_cuts: BTreeMap::new(),
            new_vertices: Vec::new(),
            section_curves: Vec::new(),
            caps: Vec::new(),
            halves: BTreeMap::new(),
            modification: GeomModification::default(),
        }
    }

    pub fn mode(&self) -> Dim {
        self.mode
    }

    fn reset(&mut self) {
        self.allowed.clear();
        self.curve_cuts.clear();
        self.surface_cuts.clear();
        self.new_vertices.clear();
        self.section_curves.clear();
        self.caps.clear();
        self.halves.clear();
        self.modification = GeomModification::default();
    }

    /// 点相对平面的位置：1 正侧，-1 负侧，0 在平面上
    fn side(&self, point: &Point3, tolerance: f64) -> i8 {
        let d = self.plane.signed_distance(point);
        if d > tolerance {
            1
        } else if d < -tolerance {
            -1
        } else {
            0
        }
    }

    fn replace(&mut self, old: EntityId, positive: EntityId, negative: EntityId) {
        self.modification.removed.push(old);
        self.modification.replaced.push((old, positive));
        self.modification.replaced.push((old, negative));
        self.halves.insert(old, (positive, negative));
    }

    /// 在穿过平面处切开曲线，每条曲线只计算一次
    fn cut_curve(&mut self, scope: &mut GeomScope<'_>, curve: EntityId) -> Result<Option<CurveSplit>> {
        if let Some(cut) = self.curve_cuts.get(&curve) {
            return Ok(*cut);
        }
        let tolerance = scope.tolerance();
        let c = scope.ctx.geom.curve(curve)?.clone();
        let sides: Vec<i8> = c.points.iter().map(|p| self.side(p, tolerance)).collect();

        // (穿过前最后一个离开平面的点, 穿过后第一个离开平面的点)
        let mut crossings = Vec::new();
        let mut last: Option<usize> = None;
        for (i, side) in sides.iter().enumerate() {
            if *side == 0 {
                continue;
            }
            if let Some(j) = last {
                if sides[j] != *side {
                    crossings.push((j, i));
                }
            }
            last = Some(i);
        }

        let (j, i) = match crossings.as_slice() {
            [] => {
                self.curve_cuts.insert(curve, None);
                return Ok(None);
            }
            [single] if !c.is_closed() => *single,
            _ => {
                return Err(CommandError::Execution(format!(
                    "curve {} crosses the plane more than once",
                    scope.ctx.geom.name_of(curve)
                )))
            }
        };
        for surface in scope.ctx.geom.live_upper(curve)? {
            if !self.allowed.contains(&surface) {
                return Err(CommandError::Execution(format!(
                    "curve {} is shared with surface {} which is not cut",
                    scope.ctx.geom.name_of(curve),
                    scope.ctx.geom.name_of(surface)
                )));
            }
        }

        let (point, first, second) = if i == j + 1 {
            let point = self
                .plane
                .intersect_segment(&c.points[j], &c.points[i])
                .ok_or_else(|| CommandError::Internal("segment does not cross the plane".to_string()))?;
            let mut first = c.points[..=j].to_vec();
            first.push(point);
            let mut second = vec![point];
            second.extend_from_slice(&c.points[i..]);
            (point, first, second)
        } else {
            // 内部离散点正好落在平面上
            let k = j + 1;
            (c.points[k], c.points[..=k].to_vec(), c.points[k..].to_vec())
        };

        let vertex = scope.store_vertex(point)?;
        let a = scope.store_curve(first, vec![c.vertices[0], vertex])?;
        let b = scope.store_curve(second, vec![vertex, c.vertices[1]])?;
        debug!(
            "Curve {} split at {}",
            scope.ctx.geom.name_of(curve),
            scope.ctx.geom.name_of(vertex)
        );

        self.new_vertices.push(vertex);
        self.modification.removed.push(curve);
        self.modification.replaced.push((curve, a));
        self.modification.replaced.push((curve, b));
        let split = CurveSplit {
            vertex,
            pieces: [a, b],
        };
        self.curve_cuts.insert(curve, Some(split));
        Ok(Some(split))
    }

    /// 沿截线切开曲面，每个曲面只计算一次
    fn cut_surface(&mut self, scope: &mut GeomScope<'_>, surface: EntityId) -> Result<Option<SurfaceSplit>> {
        if let Some(cut) = self.surface_cuts.get(&surface) {
            return Ok(*cut);
        }
        let tolerance = scope.tolerance();
        let loop_vertices = scope.ctx.geom.surface_vertex_loop(surface)?;
        let curves = scope.ctx.geom.surface(surface)?.curves.clone();

        // 环上的 (顶点, 从它出发的曲线, 顶点在平面上)
        let mut ring: Vec<(EntityId, EntityId, bool)> = Vec::with_capacity(curves.len() + 2);
        let mut split_any = false;
        for (curve, start) in curves.iter().zip(&loop_vertices) {
            let on_plane = self.side(&scope.ctx.geom.point(*start)?, tolerance) == 0;
            match self.cut_curve(scope, *curve)? {
                None => ring.push((*start, *curve, on_plane)),
                Some(split) => {
                    split_any = true;
                    let forward = scope.ctx.geom.curve(*curve)?.vertices.first() == Some(start);
                    let (from_start, to_end) = if forward {
                        (split.pieces[0], split.pieces[1])
                    } else {
                        (split.pieces[1], split.pieces[0])
                    };
                    ring.push((*start, from_start, on_plane));
                    ring.push((split.vertex, to_end, true));
                }
            }
        }

        let cuts: Vec<usize> = ring
            .iter()
            .enumerate()
            .filter(|(_, (_, _, on))| *on)
            .map(|(k, _)| k)
            .collect();
        if cuts.len() > 2 {
            return Err(CommandError::Execution(format!(
                "surface {} meets the plane in {} points, only convex surfaces can be cut",
                scope.ctx.geom.name_of(surface),
                cuts.len()
            )));
        }

        let n = ring.len();
        let split = match cuts.as_slice() {
            [i, j] if *j != i + 1 && !(*i == 0 && *j == n - 1) => {
                let (i, j) = (*i, *j);
                let side_of = |range: &mut dyn Iterator<Item = usize>| -> Result<i8> {
                    for k in range {
                        let side = self.side(&scope.ctx.geom.point(ring[k].0)?, tolerance);
                        if side != 0 {
                            return Ok(side);
                        }
                    }
                    Ok(0)
                };
                let side_a = side_of(&mut (i + 1..j))?;
                let side_b = side_of(&mut (j + 1..n).chain(0..i))?;
                (side_a != 0 && side_b != 0 && side_a != side_b).then_some((i, j, side_a))
            }
            _ => None,
        };

        let Some((i, j, side_a)) = split else {
            if split_any {
                return Err(CommandError::Execution(format!(
                    "surface {} cannot be cut along a single section",
                    scope.ctx.geom.name_of(surface)
                )));
            }
            self.surface_cuts.insert(surface, None);
            return Ok(None);
        };

        let section = scope.store_segment(ring[i].0, ring[j].0)?;
        let mut loop_a: Vec<EntityId> = ring[i..j].iter().map(|r| r.1).collect();
        loop_a.push(section);
        let mut loop_b: Vec<EntityId> = ring[j..].iter().chain(&ring[..i]).map(|r| r.1).collect();
        loop_b.push(section);
        let a = scope.store_surface(loop_a)?;
        let b = scope.store_surface(loop_b)?;
        let (positive, negative) = if side_a > 0 { (a, b) } else { (b, a) };

        self.replace(surface, positive, negative);
        let split = SurfaceSplit {
            positive,
            negative,
            section,
        };
        self.surface_cuts.insert(surface, Some(split));
        Ok(Some(split))
    }

    /// 切开体：两半共享截面
    fn cut_volume(&mut self, scope: &mut GeomScope<'_>, volume: EntityId) -> Result<()> {
        let tolerance = scope.tolerance();
        let faces = scope.ctx.geom.entity(volume)?.shape.lower().to_vec();

        let mut splits = BTreeMap::new();
        for face in &faces {
            if let Some(split) = self.cut_surface(scope, *face)? {
                for other in scope.ctx.geom.live_upper(*face)? {
                    if !self.entities.contains(&other) {
                        return Err(CommandError::Execution(format!(
                            "surface {} is shared with volume {} which is not cut",
                            scope.ctx.geom.name_of(*face),
                            scope.ctx.geom.name_of(other)
                        )));
                    }
                }
                splits.insert(*face, split);
            }
        }

        let mut section: BTreeSet<EntityId> = splits.values().map(|s| s.section).collect();
        for face in faces.iter().filter(|f| !splits.contains_key(f)) {
            for curve in &scope.ctx.geom.surface(*face)?.curves {
                let on_plane = scope
                    .ctx
                    .geom
                    .curve(*curve)?
                    .points
                    .iter()
                    .all(|p| self.side(p, tolerance) == 0);
                if on_plane {
                    section.insert(*curve);
                }
            }
        }
        if section.is_empty() {
            return Ok(());
        }
        let cap_loop = chain_loop(&scope.ctx.geom, section.into_iter().collect()).ok_or_else(|| {
            CommandError::Execution(format!(
                "section of volume {} is not a closed loop",
                scope.ctx.geom.name_of(volume)
            ))
        })?;
        let cap = scope.store_surface(cap_loop)?;

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for face in &faces {
            if let Some(split) = splits.get(face) {
                positive.push(split.positive);
                negative.push(split.negative);
                continue;
            }
            let mut sides = BTreeSet::new();
            for v in scope.ctx.geom.surface_vertex_loop(*face)? {
                sides.insert(self.side(&scope.ctx.geom.point(v)?, tolerance));
            }
            if sides.contains(&1) && !sides.contains(&-1) {
                positive.push(*face);
            } else if sides.contains(&-1) && !sides.contains(&1) {
                negative.push(*face);
            } else {
                return Err(CommandError::Execution(format!(
                    "surface {} of volume {} cannot be assigned to a side of the plane",
                    scope.ctx.geom.name_of(*face),
                    scope.ctx.geom.name_of(volume)
                )));
            }
        }
        positive.push(cap);
        negative.push(cap);
        let pos = scope.store_volume(positive)?;
        let neg = scope.store_volume(negative)?;

        self.caps.push(cap);
        self.replace(volume, pos, neg);
        Ok(())
    }
}

/// 把曲线首尾相连排成闭合环，不能闭合时返回 None
fn chain_loop(geom: &GeomManager, mut curves: Vec<EntityId>) -> Option<Vec<EntityId>> {
    if curves.is_empty() {
        return None;
    }
    let first = curves.remove(0);
    let c = geom.curve(first).ok()?;
    let start = *c.vertices.first()?;
    let mut current = c.opposite_vertex(start)?;
    let mut ordered = vec![first];
    while current != start {
        let k = curves.iter().position(|id| {
            geom.curve(*id)
                .map(|c| c.vertices.contains(&current))
                .unwrap_or(false)
        })?;
        let next = curves.remove(k);
        current = geom.curve(next).ok()?.opposite_vertex(current)?;
        ordered.push(next);
    }
    curves.is_empty().then_some(ordered)
}

impl EditOperation for SectionByPlaneOperation {
    fn name(&self) -> &'static str {
        "SectionByPlane"
    }

    fn ref_entities(&self) -> Vec<EntityId> {
        self.entities.clone()
    }

    fn dim_new_group(&self) -> Dim {
        if self.mode == Dim::Volume {
            Dim::Surface
        } else {
            Dim::Curve
        }
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        if self.entities.is_empty() {
            return Err(CommandError::Validation("nothing to cut".to_string()));
        }
        if !matches!(self.mode, Dim::Surface | Dim::Volume) {
            return Err(CommandError::Validation(format!(
                "only surfaces or volumes can be cut, got a {}",
                self.mode
            )));
        }
        for id in &self.entities {
            check_live(ctx, *id, self.mode)?;
            if self.mode == Dim::Surface && !ctx.geom.live_upper(*id)?.is_empty() {
                return Err(CommandError::Validation(format!(
                    "surface {} bounds a volume, cut the volume instead",
                    ctx.geom.name_of(*id)
                )));
            }
        }
        Ok(())
    }

    fn modify(&mut self, scope: &mut GeomScope<'_>) -> Result<GeomModification> {
        self.reset();
        let tolerance = scope.tolerance();
        for id in &self.entities {
            if self.mode == Dim::Volume {
                self.allowed
                    .extend(scope.ctx.geom.entity(*id)?.shape.lower().iter().copied());
            } else {
                self.allowed.insert(*id);
            }
        }

        for id in self.entities.clone() {
            let bbox = scope.ctx.geom.bounding_box(id)?;
            if self.plane.separates(&bbox, tolerance) {
                debug!("{} is not crossed by the plane", scope.ctx.geom.name_of(id));
                continue;
            }
            if self.mode == Dim::Volume {
                self.cut_volume(scope, id)?;
            } else if let Some(split) = self.cut_surface(scope, id)? {
                self.section_curves.push(split.section);
            }
        }
        Ok(std::mem::take(&mut self.modification))
    }
}

pub type CommandSectionByPlane = CommandEditGeom<SectionByPlaneOperation>;

impl CommandSectionByPlane {
    /// 剖切曲面或体，截线或截面进入 `plane_group`
    pub fn new(
        ctx: &Context,
        entities: Vec<EntityId>,
        plane: Plane,
        plane_group: impl Into<String>,
    ) -> Result<Self> {
        let op = SectionByPlaneOperation::new(ctx, entities, plane);
        Self::with_operation(ctx, op, plane_group)
    }
}
