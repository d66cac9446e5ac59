//! 基本构造命令：顶点、线段、平面多边形和长方体
//!
//! 每个命令描述一个高维实体的草图，由 `split` 拆分保存为各维度实体。

use super::{check_live, polygon_draft, polygon_normal};
use crate::command::create_geom::{CommandCreateGeom, DraftRef, GeomOperation, GeomScope, ShapeDraft};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use crate::math::{points_approx_eq, Point3};
use std::collections::BTreeMap;

/// 新建顶点
#[derive(Debug, Clone)]
pub struct NewVertexOperation {
    pub point: Point3,
}

impl GeomOperation for NewVertexOperation {
    fn name(&self) -> &'static str {
        "NewVertex"
    }

    fn dim_new_group(&self) -> Dim {
        Dim::Vertex
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        let mut draft = ShapeDraft::new();
        draft.vertex(self.point);
        scope.split(&draft)?;
        Ok(())
    }
}

pub type CommandNewVertex = CommandCreateGeom<NewVertexOperation>;

impl CommandNewVertex {
    pub fn new(ctx: &Context, point: Point3, group_name: impl Into<String>) -> Result<Self> {
        Self::with_operation(ctx, NewVertexOperation { point }, group_name)
    }
}

/// 连接两个已有顶点的线段
#[derive(Debug, Clone)]
pub struct NewSegmentOperation {
    pub start: EntityId,
    pub end: EntityId,
}

impl GeomOperation for NewSegmentOperation {
    fn name(&self) -> &'static str {
        "NewSegment"
    }

    fn dim_new_group(&self) -> Dim {
        Dim::Curve
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        check_live(ctx, self.start, Dim::Vertex)?;
        check_live(ctx, self.end, Dim::Vertex)?;
        if points_approx_eq(&ctx.geom.point(self.start)?, &ctx.geom.point(self.end)?) {
            return Err(CommandError::Validation(
                "segment extremities must be distinct".to_string(),
            ));
        }
        Ok(())
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        let points = vec![scope.ctx.geom.point(self.start)?, scope.ctx.geom.point(self.end)?];
        let mut draft = ShapeDraft::new();
        draft.curve(
            points,
            DraftRef::Existing(self.start),
            DraftRef::Existing(self.end),
        );
        scope.split(&draft)?;
        Ok(())
    }
}

pub type CommandNewSegment = CommandCreateGeom<NewSegmentOperation>;

impl CommandNewSegment {
    pub fn new(
        ctx: &Context,
        start: EntityId,
        end: EntityId,
        group_name: impl Into<String>,
    ) -> Result<Self> {
        Self::with_operation(ctx, NewSegmentOperation { start, end }, group_name)
    }
}

/// 由顶点坐标围成的平面多边形
#[derive(Debug, Clone)]
pub struct NewPlanarSurfaceOperation {
    pub points: Vec<Point3>,
}

impl GeomOperation for NewPlanarSurfaceOperation {
    fn name(&self) -> &'static str {
        "NewPlanarSurface"
    }

    fn dim_new_group(&self) -> Dim {
        Dim::Surface
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        if self.points.len() < 3 {
            return Err(CommandError::Validation(format!(
                "a planar surface needs at least 3 points, got {}",
                self.points.len()
            )));
        }
        let normal = polygon_normal(&self.points);
        let norm = normal.norm();
        if norm <= ctx.tolerance() {
            return Err(CommandError::Validation(
                "surface points are aligned".to_string(),
            ));
        }
        let normal = normal / norm;
        let origin = self.points[0];
        for p in &self.points {
            if (p - origin).dot(&normal).abs() > ctx.tolerance().max(1e-6) {
                return Err(CommandError::Validation(
                    "surface points are not coplanar".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        let mut draft = ShapeDraft::new();
        let vertices: Vec<DraftRef> = self.points.iter().map(|p| draft.vertex(*p)).collect();
        polygon_draft(&mut draft, &vertices, &self.points, |_, _, _| None);
        scope.split(&draft)?;
        Ok(())
    }
}

pub type CommandNewPlanarSurface = CommandCreateGeom<NewPlanarSurfaceOperation>;

impl CommandNewPlanarSurface {
    pub fn new(ctx: &Context, points: Vec<Point3>, group_name: impl Into<String>) -> Result<Self> {
        Self::with_operation(ctx, NewPlanarSurfaceOperation { points }, group_name)
    }
}

/// 与坐标轴对齐的长方体
#[derive(Debug, Clone)]
pub struct NewBoxOperation {
    pub min: Point3,
    pub max: Point3,
}

/// 长方体的6个面，顶点编号 i = x + 2y + 4z
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 1, 3, 2],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [0, 2, 6, 4],
    [1, 3, 7, 5],
];

impl GeomOperation for NewBoxOperation {
    fn name(&self) -> &'static str {
        "NewBox"
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        let size = self.max - self.min;
        if size.iter().any(|d| *d <= ctx.tolerance()) {
            return Err(CommandError::Validation(format!(
                "box corners must be strictly ordered, got size {:?}",
                size.as_slice()
            )));
        }
        Ok(())
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        let corners: Vec<Point3> = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 == 0 { self.min.x } else { self.max.x },
                    if i & 2 == 0 { self.min.y } else { self.max.y },
                    if i & 4 == 0 { self.min.z } else { self.max.z },
                )
            })
            .collect();

        let mut draft = ShapeDraft::new();
        let vertices: Vec<DraftRef> = corners.iter().map(|p| draft.vertex(*p)).collect();
        let mut edges: BTreeMap<(usize, usize), DraftRef> = BTreeMap::new();
        let faces: Vec<DraftRef> = BOX_FACES
            .iter()
            .map(|face| {
                let face_vertices: Vec<DraftRef> = face.iter().map(|i| vertices[*i]).collect();
                let face_points: Vec<Point3> = face.iter().map(|i| corners[*i]).collect();
                polygon_draft(&mut draft, &face_vertices, &face_points, |draft, a, b| {
                    let key = (face[a].min(face[b]), face[a].max(face[b]));
                    let edge = *edges.entry(key).or_insert_with(|| {
                        draft.curve(
                            vec![corners[key.0], corners[key.1]],
                            vertices[key.0],
                            vertices[key.1],
                        )
                    });
                    Some(edge)
                })
            })
            .collect();
        draft.volume(faces);
        scope.split(&draft)?;
        Ok(())
    }
}

pub type CommandNewBox = CommandCreateGeom<NewBoxOperation>;

impl CommandNewBox {
    pub fn new(
        ctx: &Context,
        min: Point3,
        max: Point3,
        group_name: impl Into<String>,
    ) -> Result<Self> {
        Self::with_operation(ctx, NewBoxOperation { min, max }, group_name)
    }
}
