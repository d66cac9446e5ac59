//! 合并首尾相连的曲线
//!
//! 被合并的曲线必须位于相同的曲面上，并且构成一条不分叉的链或一个环。
//! 链内部的顶点随曲线一起作废；环合并为只有一个顶点的闭合曲线。

use super::check_live;
use crate::command::create_geom::GeomScope;
use crate::command::edit_geom::{CommandEditGeom, EditOperation, GeomModification};
use crate::context::Context;
use crate::entity::{Dim, EntityId};
use crate::error::{CommandError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// 曲线合并操作
#[derive(Debug, Clone)]
pub struct JoinCurvesOperation {
    pub curves: Vec<EntityId>,

    /// 合并得到的曲线
    pub joined: Option<EntityId>,
}

impl JoinCurvesOperation {
    pub fn new(curves: Vec<EntityId>) -> Self {
        Self {
            curves,
            joined: None,
        }
    }
}

fn discontinuous() -> CommandError {
    CommandError::Execution("discontinuous curves".to_string())
}

impl EditOperation for JoinCurvesOperation {
    fn name(&self) -> &'static str {
        "JoinCurves"
    }

    fn ref_entities(&self) -> Vec<EntityId> {
        self.curves.clone()
    }

    fn dim_new_group(&self) -> Dim {
        Dim::Curve
    }

    fn validate(&self, ctx: &Context) -> Result<()> {
        if self.curves.len() < 2 {
            return Err(CommandError::Validation(
                "at least two curves are needed".to_string(),
            ));
        }
        let unique: BTreeSet<EntityId> = self.curves.iter().copied().collect();
        if unique.len() != self.curves.len() {
            return Err(CommandError::Validation(
                "a curve is selected twice".to_string(),
            ));
        }

        let mut surfaces: Option<BTreeSet<EntityId>> = None;
        for id in &self.curves {
            check_live(ctx, *id, Dim::Curve)?;
            if ctx.geom.curve(*id)?.is_closed() {
                return Err(CommandError::Validation(format!(
                    "curve {} is closed",
                    ctx.geom.name_of(*id)
                )));
            }
            let upper: BTreeSet<EntityId> = ctx.geom.live_upper(*id)?.into_iter().collect();
            match &surfaces {
                None => surfaces = Some(upper),
                Some(expected) if *expected != upper => {
                    return Err(CommandError::Validation(
                        "curves must lie on the same surfaces".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn modify(&mut self, scope: &mut GeomScope<'_>) -> Result<GeomModification> {
        self.joined = None;
        let geom = &scope.ctx.geom;

        let mut incidence: BTreeMap<EntityId, usize> = BTreeMap::new();
        for id in &self.curves {
            for v in &geom.curve(*id)?.vertices {
                *incidence.entry(*v).or_default() += 1;
            }
        }
        if let Some((v, _)) = incidence.iter().find(|(_, n)| **n > 2) {
            return Err(CommandError::Execution(format!(
                "vertex {} joins more than two of the curves",
                geom.name_of(*v)
            )));
        }
        let extremities: Vec<EntityId> = incidence
            .iter()
            .filter(|(_, n)| **n == 1)
            .map(|(v, _)| *v)
            .collect();
        let start = match extremities.as_slice() {
            [] => geom.curve(self.curves[0])?.vertices[0],
            [a, _] => *a,
            _ => return Err(discontinuous()),
        };

        let mut inner = Vec::new();
        for (v, n) in &incidence {
            if *n == 2 && *v != start {
                if geom.live_upper(*v)?.len() != 2 {
                    return Err(CommandError::Execution(format!(
                        "vertex {} is shared with other curves",
                        geom.name_of(*v)
                    )));
                }
                inner.push(*v);
            }
        }

        // 沿链行走，按行走方向拼接离散点
        let mut remaining: BTreeSet<EntityId> = self.curves.iter().copied().collect();
        let mut current = start;
        let mut chain = Vec::with_capacity(self.curves.len());
        let mut points = Vec::new();
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .copied()
                .find(|c| {
                    geom.curve(*c)
                        .map(|c| c.vertices.contains(&current))
                        .unwrap_or(false)
                })
                .ok_or_else(discontinuous)?;
            remaining.remove(&next);
            let oriented = geom.oriented_points(next, current)?;
            let skip = usize::from(!points.is_empty());
            points.extend(oriented.into_iter().skip(skip));
            current = geom
                .curve(next)?
                .opposite_vertex(current)
                .ok_or_else(discontinuous)?;
            chain.push(next);
        }
        let vertices = if extremities.is_empty() {
            if current != start {
                return Err(discontinuous());
            }
            vec![start]
        } else {
            vec![start, current]
        };
        let surfaces = geom.live_upper(self.curves[0])?;

        let joined = scope.store_curve(points, vertices)?;
        let members: BTreeSet<EntityId> = chain.iter().copied().collect();
        for surface in &surfaces {
            let order = scope.ctx.geom.surface(*surface)?.curves.clone();
            let mut first = true;
            for curve in order.iter().filter(|c| members.contains(c)) {
                let new: &[EntityId] = if first { &[joined] } else { &[] };
                scope.replace_lower(*surface, *curve, new)?;
                first = false;
            }
        }
        self.joined = Some(joined);

        let mut removed = self.curves.clone();
        removed.extend(inner);
        Ok(GeomModification {
            removed,
            kept: surfaces,
            replaced: vec![(self.curves[0], joined)],
            ..Default::default()
        })
    }
}

pub type CommandJoinCurves = CommandEditGeom<JoinCurvesOperation>;

impl CommandJoinCurves {
    pub fn new(ctx: &Context, curves: Vec<EntityId>, group_name: impl Into<String>) -> Result<Self> {
        Self::with_operation(ctx, JoinCurvesOperation::new(curves), group_name)
    }
}
