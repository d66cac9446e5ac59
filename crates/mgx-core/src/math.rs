//! 数学基础类型
//!
//! 基于 nalgebra 提供的向量和点类型的别名，以及包围盒与平面。

use nalgebra as na;
use serde::{Deserialize, Serialize};

/// 3D点类型
pub type Point3 = na::Point3<f64>;

/// 3D向量类型
pub type Vector3 = na::Vector3<f64>;

/// 数值容差，用于几何比较
pub const EPSILON: f64 = 1e-9;

/// 判断两个浮点数是否近似相等
#[inline]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// 判断两个3D点是否近似相等
#[inline]
pub fn points_approx_eq(a: &Point3, b: &Point3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

/// 3D包围盒
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox3 {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox3 {
    /// 创建新的包围盒
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// 创建空的包围盒（无效状态）
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// 从点集创建包围盒
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.expand_to_include(p);
        }
        bbox
    }

    /// 扩展包围盒以包含指定点
    pub fn expand_to_include(&mut self, point: &Point3) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// 8个角点
    pub fn corners(&self) -> [Point3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }
}

/// 切割平面
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    /// 平面上一点
    pub origin: Point3,
    /// 单位法向
    pub normal: Vector3,
}

impl Plane {
    /// 由一点和法向创建平面，法向为零时返回 None
    pub fn new(origin: Point3, normal: Vector3) -> Option<Self> {
        let norm = normal.norm();
        if norm < EPSILON {
            return None;
        }
        Some(Self {
            origin,
            normal: normal / norm,
        })
    }

    /// 有符号距离
    #[inline]
    pub fn signed_distance(&self, point: &Point3) -> f64 {
        (point - self.origin).dot(&self.normal)
    }

    /// 线段 [a, b] 与平面的交点
    pub fn intersect_segment(&self, a: &Point3, b: &Point3) -> Option<Point3> {
        let da = self.signed_distance(a);
        let db = self.signed_distance(b);
        if (da > 0.0 && db > 0.0) || (da < 0.0 && db < 0.0) || approx_eq(da, db) {
            return None;
        }
        let t = da / (da - db);
        Some(a + (b - a) * t)
    }

    /// 包围盒是否完全位于平面一侧
    pub fn separates(&self, bbox: &BoundingBox3, tolerance: f64) -> bool {
        let mut below = false;
        let mut above = false;
        for corner in bbox.corners() {
            let d = self.signed_distance(&corner);
            if d < -tolerance {
                below = true;
            } else if d > tolerance {
                above = true;
            }
        }
        !(below && above)
    }
}
