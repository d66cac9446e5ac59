//! 几何操作
//!
//! 每个操作实现 [`GeomOperation`](crate::command::create_geom::GeomOperation)
//! 或 [`EditOperation`](crate::command::edit_geom::EditOperation)，
//! 并以类型别名的形式提供对应的命令。

pub mod extrusion;
pub mod join_curves;
pub mod primitives;
pub mod prism;
pub mod section;

pub use extrusion::{CommandExtrusion, ExtrusionOperation};
pub use join_curves::{CommandJoinCurves, JoinCurvesOperation};
pub use primitives::{
    CommandNewBox, CommandNewPlanarSurface, CommandNewSegment, CommandNewVertex,
};
pub use prism::{CommandNewPrism, PrismOperation};
pub use section::{CommandSectionByPlane, SectionByPlaneOperation};

use crate::command::create_geom::{DraftRef, ShapeDraft};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use crate::math::{Point3, Vector3};

/// 平移向量不能为零
pub(crate) fn check_vector(vector: &Vector3, tolerance: f64) -> Result<()> {
    if vector.norm() <= tolerance {
        return Err(CommandError::Validation(
            "translation vector must not be null".to_string(),
        ));
    }
    Ok(())
}

/// 检查实体存在、未销毁且维度正确
pub(crate) fn check_live(ctx: &Context, id: EntityId, dim: Dim) -> Result<()> {
    let entity = ctx.geom.live(id)?;
    if entity.dim() != dim {
        return Err(CommandError::WrongDimension {
            id,
            expected: dim,
            actual: entity.dim(),
        });
    }
    Ok(())
}

/// 多边形法向（Newell 方法），未归一化
pub(crate) fn polygon_normal(points: &[Point3]) -> Vector3 {
    let mut normal = Vector3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
    }
    normal
}

/// 在草图中添加一个由顶点环围成的多边形曲面
///
/// `edge` 返回连接两个顶点的已有曲线，没有时新建线段。
pub(crate) fn polygon_draft(
    draft: &mut ShapeDraft,
    vertices: &[DraftRef],
    points: &[Point3],
    mut edge: impl FnMut(&mut ShapeDraft, usize, usize) -> Option<DraftRef>,
) -> DraftRef {
    let n = vertices.len();
    let curves: Vec<DraftRef> = (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            edge(draft, i, j).unwrap_or_else(|| {
                draft.curve(vec![points[i], points[j]], vertices[i], vertices[j])
            })
        })
        .collect();
    draft.surface(curves)
}
