//! 几何实体管理器
//!
//! 拥有所有实体，按唯一ID索引。实体被销毁后仍保留在管理器中
//! （撤销时可以恢复），只有丢弃命令或回滚时才被物理删除。
//! 查询接口只返回未销毁的实体。

use crate::display::DisplayRepresentation;
use crate::entity::{Curve, Dim, EntityId, GeomEntity, Shape, Surface, Vertex};
use crate::error::{CommandError, Result};
use crate::math::{BoundingBox3, Point3};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 实体管理器
#[derive(Debug, Clone, Default)]
pub struct GeomManager {
    /// 所有实体（包括已销毁的）
    entities: BTreeMap<EntityId, GeomEntity>,
}

impl GeomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加实体
    pub fn add_entity(&mut self, entity: GeomEntity) -> Result<EntityId> {
        let id = entity.id;
        if self.entities.contains_key(&id) {
            return Err(CommandError::Internal(format!(
                "entity {} ({}) is already registered",
                entity.name, id
            )));
        }
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// 物理删除实体，并从相邻实体的邻接表中移除
    pub fn remove_entity(&mut self, id: EntityId) -> Result<GeomEntity> {
        let entity = self
            .entities
            .remove(&id)
            .ok_or(CommandError::EntityNotFound(id))?;
        for neighbour in entity.shape.lower().iter().chain(entity.shape.upper()) {
            if let Some(other) = self.entities.get_mut(neighbour) {
                other.shape.remove_adjacent(id);
            }
        }
        debug!("Removed entity {} ({})", entity.name, id);
        Ok(entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&GeomEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut GeomEntity> {
        self.entities.get_mut(&id)
    }

    /// 获取实体，不存在时返回错误
    pub fn entity(&self, id: EntityId) -> Result<&GeomEntity> {
        self.entities.get(&id).ok_or(CommandError::EntityNotFound(id))
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut GeomEntity> {
        self.entities
            .get_mut(&id)
            .ok_or(CommandError::EntityNotFound(id))
    }

    /// 获取未销毁的实体
    pub fn live(&self, id: EntityId) -> Result<&GeomEntity> {
        let entity = self.entity(id)?;
        if entity.destroyed {
            return Err(CommandError::Validation(format!(
                "entity {} is destroyed",
                entity.name
            )));
        }
        Ok(entity)
    }

    /// 获取指定维度的实体
    pub fn entity_of_dim(&self, id: EntityId, dim: Dim) -> Result<&GeomEntity> {
        let entity = self.entity(id)?;
        if entity.dim() != dim {
            return Err(CommandError::WrongDimension {
                id,
                expected: dim,
                actual: entity.dim(),
            });
        }
        Ok(entity)
    }

    pub fn vertex(&self, id: EntityId) -> Result<&Vertex> {
        let entity = self.entity_of_dim(id, Dim::Vertex)?;
        entity
            .shape
            .as_vertex()
            .ok_or(CommandError::EntityNotFound(id))
    }

    pub fn curve(&self, id: EntityId) -> Result<&Curve> {
        let entity = self.entity_of_dim(id, Dim::Curve)?;
        entity
            .shape
            .as_curve()
            .ok_or(CommandError::EntityNotFound(id))
    }

    pub fn surface(&self, id: EntityId) -> Result<&Surface> {
        let entity = self.entity_of_dim(id, Dim::Surface)?;
        entity
            .shape
            .as_surface()
            .ok_or(CommandError::EntityNotFound(id))
    }

    pub fn point(&self, id: EntityId) -> Result<Point3> {
        Ok(self.vertex(id)?.point)
    }

    /// 实体名称，找不到时返回ID
    pub fn name_of(&self, id: EntityId) -> String {
        self.entities
            .get(&id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(|e| !e.destroyed)
    }

    /// 指定维度的未销毁实体
    pub fn entities(&self, dim: Dim) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.dim() == dim && !e.destroyed)
            .map(|e| e.id)
            .collect()
    }

    pub fn vertices(&self) -> Vec<EntityId> {
        self.entities(Dim::Vertex)
    }

    pub fn curves(&self) -> Vec<EntityId> {
        self.entities(Dim::Curve)
    }

    pub fn surfaces(&self) -> Vec<EntityId> {
        self.entities(Dim::Surface)
    }

    pub fn volumes(&self) -> Vec<EntityId> {
        self.entities(Dim::Volume)
    }

    /// 指定维度的未销毁实体数
    pub fn nb(&self, dim: Dim) -> usize {
        self.entities
            .values()
            .filter(|e| e.dim() == dim && !e.destroyed)
            .count()
    }

    /// 管理器中的实体总数（包括已销毁的）
    pub fn nb_stored(&self) -> usize {
        self.entities.len()
    }

    /// 建立相邻维度实体间的双向邻接
    pub fn link(&mut self, a: EntityId, b: EntityId) -> Result<()> {
        let dim_a = self.entity(a)?.dim();
        let dim_b = self.entity(b)?.dim();
        if dim_a.upper() != Some(dim_b) && dim_b.upper() != Some(dim_a) {
            return Err(CommandError::Internal(format!(
                "cannot link {} entity {} with {} entity {}",
                dim_a, a, dim_b, b
            )));
        }
        self.entity_mut(a)?.shape.add_adjacent(dim_b, b);
        self.entity_mut(b)?.shape.add_adjacent(dim_a, a);
        Ok(())
    }

    /// 解除双向邻接
    pub fn unlink(&mut self, a: EntityId, b: EntityId) -> Result<()> {
        self.entity_mut(a)?.shape.remove_adjacent(b);
        self.entity_mut(b)?.shape.remove_adjacent(a);
        Ok(())
    }

    /// 未销毁的低一维邻接实体
    pub fn live_lower(&self, id: EntityId) -> Result<Vec<EntityId>> {
        Ok(self
            .entity(id)?
            .shape
            .lower()
            .iter()
            .copied()
            .filter(|n| self.is_live(*n))
            .collect())
    }

    /// 未销毁的高一维邻接实体
    pub fn live_upper(&self, id: EntityId) -> Result<Vec<EntityId>> {
        Ok(self
            .entity(id)?
            .shape
            .upper()
            .iter()
            .copied()
            .filter(|n| self.is_live(*n))
            .collect())
    }

    /// 实体及其所有低维边界实体
    pub fn downward_closure(&self, ids: &[EntityId]) -> Result<BTreeSet<EntityId>> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<EntityId> = ids.to_vec();
        while let Some(id) = stack.pop() {
            if closure.insert(id) {
                stack.extend_from_slice(self.entity(id)?.shape.lower());
            }
        }
        Ok(closure)
    }

    /// 标记为销毁并从未销毁邻居的邻接表中移除
    ///
    /// 先标记整批实体，批内实体之间的邻接因此保留。
    pub fn destroy_and_unlink(&mut self, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            self.entity_mut(*id)?.destroyed = true;
        }
        for id in ids {
            let entity = self.entity(*id)?;
            let neighbours: Vec<EntityId> = entity
                .shape
                .lower()
                .iter()
                .chain(entity.shape.upper())
                .copied()
                .collect();
            for neighbour in neighbours {
                if let Some(other) = self.entities.get_mut(&neighbour) {
                    if !other.destroyed {
                        other.shape.remove_adjacent(*id);
                    }
                }
            }
        }
        Ok(())
    }

    /// 交换实体的几何与邻接（备忘录）
    pub fn swap_shape(&mut self, id: EntityId, shape: &mut Shape) -> Result<()> {
        let entity = self.entity_mut(id)?;
        std::mem::swap(&mut entity.shape, shape);
        Ok(())
    }

    /// 曲面边界上的有序顶点环
    pub fn surface_vertex_loop(&self, id: EntityId) -> Result<Vec<EntityId>> {
        let surface = self.surface(id)?;
        let curves: Vec<&Curve> = surface
            .curves
            .iter()
            .map(|c| self.curve(*c))
            .collect::<Result<_>>()?;

        match curves.as_slice() {
            [] => Ok(Vec::new()),
            [single] => Ok(single.vertices.iter().take(1).copied().collect()),
            [first, second, ..] => {
                // 第一条曲线上不与第二条共享的端点作为起点
                let mut current = first
                    .vertices
                    .iter()
                    .copied()
                    .find(|v| !second.vertices.contains(v))
                    .or_else(|| first.vertices.first().copied())
                    .ok_or_else(|| self.broken_loop(id))?;
                let mut loop_vertices = Vec::with_capacity(curves.len());
                for curve in &curves {
                    loop_vertices.push(current);
                    current = curve
                        .opposite_vertex(current)
                        .ok_or_else(|| self.broken_loop(id))?;
                }
                if current != loop_vertices[0] {
                    return Err(self.broken_loop(id));
                }
                Ok(loop_vertices)
            }
        }
    }

    fn broken_loop(&self, surface: EntityId) -> CommandError {
        CommandError::Execution(format!(
            "boundary of surface {} is not a closed loop",
            self.name_of(surface)
        ))
    }

    /// 按起点方向取曲线的离散点
    pub fn oriented_points(&self, curve: EntityId, start: EntityId) -> Result<Vec<Point3>> {
        let c = self.curve(curve)?;
        let mut points = c.points.clone();
        if c.vertices.first() != Some(&start) {
            points.reverse();
        }
        Ok(points)
    }

    /// 曲面边界多边形（不重复首点）
    pub fn surface_polygon(&self, id: EntityId) -> Result<Vec<Point3>> {
        let loop_vertices = self.surface_vertex_loop(id)?;
        let curves = &self.surface(id)?.curves;
        let mut polygon = Vec::new();
        for (curve, start) in curves.iter().zip(&loop_vertices) {
            let points = self.oriented_points(*curve, *start)?;
            polygon.extend_from_slice(&points[..points.len().saturating_sub(1)]);
        }
        Ok(polygon)
    }

    /// 实体包含的所有离散点
    fn collect_points(&self, id: EntityId, out: &mut Vec<Point3>) -> Result<()> {
        match &self.entity(id)?.shape {
            Shape::Vertex(v) => out.push(v.point),
            Shape::Curve(c) => out.extend_from_slice(&c.points),
            Shape::Surface(s) => {
                for curve in &s.curves {
                    self.collect_points(*curve, out)?;
                }
            }
            Shape::Volume(v) => {
                for surface in &v.surfaces {
                    self.collect_points(*surface, out)?;
                }
            }
        }
        Ok(())
    }

    /// 包围盒
    pub fn bounding_box(&self, id: EntityId) -> Result<BoundingBox3> {
        let mut points = Vec::new();
        self.collect_points(id, &mut points)?;
        Ok(BoundingBox3::from_points(points.iter()))
    }

    /// 添加实体的显示表示：顶点为点，其他维度为边界曲线的离散
    pub fn representation(&self, id: EntityId, rep: &mut DisplayRepresentation) -> Result<()> {
        let entity = self.entity(id)?;
        if let Shape::Vertex(v) = &entity.shape {
            rep.add_point(v.point);
            return Ok(());
        }
        let curves: BTreeSet<EntityId> = self
            .downward_closure(&[id])?
            .into_iter()
            .filter(|e| self.get(*e).is_some_and(|e| e.dim() == Dim::Curve))
            .collect();
        for curve in curves {
            rep.add_polyline(&self.curve(curve)?.points);
        }
        Ok(())
    }
}
