//! 几何拓扑实体
//!
//! 实体按维度分为顶点、曲线、曲面和体：
//! - `EntityId`: 由名称管理器分配的唯一标识
//! - `Shape`: 按维度区分的几何数据和邻接关系
//! - `GeomEntity`: 实体本身，包含名称、销毁标记和所属分组
//!
//! 实体之间不互相拥有，所有引用都是 `EntityId`，由 `GeomManager` 解析。

use crate::group::GroupId;
use crate::math::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 实体唯一标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    /// 唯一ID
    pub id: u64,
}

impl EntityId {
    /// 从指定值创建
    pub fn from_raw(id: u64) -> Self {
        Self { id }
    }

    /// 空ID（无效）
    pub const NULL: EntityId = EntityId { id: 0 };

    /// 检查是否为空ID
    pub fn is_null(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// 实体维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dim {
    Vertex = 0,
    Curve = 1,
    Surface = 2,
    Volume = 3,
}

impl Dim {
    /// 所有维度，从低到高
    pub const ALL: [Dim; 4] = [Dim::Vertex, Dim::Curve, Dim::Surface, Dim::Volume];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Dim> {
        Self::ALL.get(index).copied()
    }

    /// 高一维
    pub fn upper(self) -> Option<Dim> {
        Self::from_index(self.index() + 1)
    }

    /// 低一维
    pub fn lower(self) -> Option<Dim> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// 名称前缀
    pub fn name_prefix(self) -> &'static str {
        match self {
            Dim::Vertex => "Pt",
            Dim::Curve => "Crb",
            Dim::Surface => "Surf",
            Dim::Volume => "Vol",
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}D", self.index())
    }
}

/// 顶点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Point3,
    /// 相连的曲线
    pub curves: Vec<EntityId>,
}

/// 曲线（折线）
///
/// 闭合曲线只有一个顶点，首尾点相同。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// 离散点，首尾分别位于端点顶点上
    pub points: Vec<Point3>,
    pub vertices: Vec<EntityId>,
    pub surfaces: Vec<EntityId>,
}

impl Curve {
    /// 给定一个端点，返回另一个端点
    pub fn opposite_vertex(&self, vertex: EntityId) -> Option<EntityId> {
        match self.vertices.as_slice() {
            [a, b] if *a == vertex => Some(*b),
            [a, b] if *b == vertex => Some(*a),
            [a] if *a == vertex => Some(*a),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.vertices.len() == 1
    }
}

/// 曲面，由有序的曲线环围成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub curves: Vec<EntityId>,
    pub volumes: Vec<EntityId>,
}

/// 体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub surfaces: Vec<EntityId>,
}

/// 按维度区分的几何数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Vertex(Vertex),
    Curve(Curve),
    Surface(Surface),
    Volume(Volume),
}

impl Shape {
    pub fn dim(&self) -> Dim {
        match self {
            Shape::Vertex(_) => Dim::Vertex,
            Shape::Curve(_) => Dim::Curve,
            Shape::Surface(_) => Dim::Surface,
            Shape::Volume(_) => Dim::Volume,
        }
    }

    /// 低一维的邻接实体
    pub fn lower(&self) -> &[EntityId] {
        match self {
            Shape::Vertex(_) => &[],
            Shape::Curve(c) => &c.vertices,
            Shape::Surface(s) => &s.curves,
            Shape::Volume(v) => &v.surfaces,
        }
    }

    /// 高一维的邻接实体
    pub fn upper(&self) -> &[EntityId] {
        match self {
            Shape::Vertex(v) => &v.curves,
            Shape::Curve(c) => &c.surfaces,
            Shape::Surface(s) => &s.volumes,
            Shape::Volume(_) => &[],
        }
    }

    fn adjacency_mut(&mut self, dim: Dim) -> Option<&mut Vec<EntityId>> {
        match (self, dim) {
            (Shape::Vertex(v), Dim::Curve) => Some(&mut v.curves),
            (Shape::Curve(c), Dim::Vertex) => Some(&mut c.vertices),
            (Shape::Curve(c), Dim::Surface) => Some(&mut c.surfaces),
            (Shape::Surface(s), Dim::Curve) => Some(&mut s.curves),
            (Shape::Surface(s), Dim::Volume) => Some(&mut s.volumes),
            (Shape::Volume(v), Dim::Surface) => Some(&mut v.surfaces),
            _ => None,
        }
    }

    /// 添加一个相邻维度的实体，已存在时忽略
    pub fn add_adjacent(&mut self, dim: Dim, id: EntityId) -> bool {
        match self.adjacency_mut(dim) {
            Some(list) => {
                if !list.contains(&id) {
                    list.push(id);
                }
                true
            }
            None => false,
        }
    }

    /// 从邻接表中移除实体
    pub fn remove_adjacent(&mut self, id: EntityId) {
        for dim in Dim::ALL {
            if let Some(list) = self.adjacency_mut(dim) {
                list.retain(|other| *other != id);
            }
        }
    }

    /// 替换低一维邻接中的实体，保持位置
    pub fn replace_lower(&mut self, old: EntityId, new: &[EntityId]) {
        let Some(lower_dim) = self.dim().lower() else {
            return;
        };
        if let Some(list) = self.adjacency_mut(lower_dim) {
            if let Some(pos) = list.iter().position(|id| *id == old) {
                list.splice(pos..=pos, new.iter().copied());
            }
        }
    }

    pub fn as_vertex(&self) -> Option<&Vertex> {
        match self {
            Shape::Vertex(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_curve(&self) -> Option<&Curve> {
        match self {
            Shape::Curve(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_surface(&self) -> Option<&Surface> {
        match self {
            Shape::Surface(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_volume(&self) -> Option<&Volume> {
        match self {
            Shape::Volume(v) => Some(v),
            _ => None,
        }
    }
}

/// 几何实体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeomEntity {
    /// 唯一标识符
    pub id: EntityId,

    /// 名称（如 "Vol0003"）
    pub name: String,

    /// 是否已销毁（撤销后或被替换后）
    pub destroyed: bool,

    /// 所属分组
    pub groups: Vec<GroupId>,

    /// 几何与邻接
    pub shape: Shape,
}

impl GeomEntity {
    /// 创建新实体
    pub fn new(id: EntityId, name: impl Into<String>, shape: Shape) -> Self {
        Self {
            id,
            name: name.into(),
            destroyed: false,
            groups: Vec::new(),
            shape,
        }
    }

    pub fn dim(&self) -> Dim {
        self.shape.dim()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// 所属分组数
    pub fn nb_groups(&self) -> usize {
        self.groups.len()
    }
}
