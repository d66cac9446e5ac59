//! 预览用的轻量显示表示

use crate::math::Point3;
use serde::{Deserialize, Serialize};

/// 显示表示
///
/// `points` 是坐标序列；`curve_discretization` 为空时表示纯点集，
/// 否则每两个索引组成一条线段。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayRepresentation {
    pub points: Vec<Point3>,
    pub curve_discretization: Vec<usize>,
}

impl DisplayRepresentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个孤立点
    pub fn add_point(&mut self, point: Point3) {
        self.points.push(point);
    }

    /// 添加一条折线，相邻点之间各生成一条线段
    pub fn add_polyline(&mut self, polyline: &[Point3]) {
        let first = self.points.len();
        self.points.extend_from_slice(polyline);
        for i in 1..polyline.len() {
            self.curve_discretization.push(first + i - 1);
            self.curve_discretization.push(first + i);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 线段数
    pub fn nb_segments(&self) -> usize {
        self.curve_discretization.len() / 2
    }
}
