//! 网格管理器接口
//!
//! 网格数据结构不在本库中实现。分组成员变化时，维度大于0的实体
//! 需要通知网格管理器更新对应的网格分组。

use crate::entity::{Dim, EntityId};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// 网格管理器
pub trait MeshManager: Debug + Send {
    /// 实体加入或离开分组后更新网格分组
    fn update_group_mesh(&mut self, entity: EntityId, dim: Dim, group: &str, added: bool);
}

/// 没有网格时使用的空实现
#[derive(Debug, Default)]
pub struct NullMeshManager;

impl MeshManager for NullMeshManager {
    fn update_group_mesh(&mut self, _entity: EntityId, _dim: Dim, _group: &str, _added: bool) {}
}

/// 一次网格分组更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshUpdate {
    pub entity: EntityId,
    pub dim: Dim,
    pub group: String,
    pub added: bool,
}

/// 记录所有通知，克隆体共享同一份记录
#[derive(Debug, Default, Clone)]
pub struct RecordingMeshManager {
    updates: Arc<Mutex<Vec<MeshUpdate>>>,
}

impl RecordingMeshManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收到的通知
    pub fn updates(&self) -> Vec<MeshUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

impl MeshManager for RecordingMeshManager {
    fn update_group_mesh(&mut self, entity: EntityId, dim: Dim, group: &str, added: bool) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(MeshUpdate {
                entity,
                dim,
                group: group.to_string(),
                added,
            });
        }
    }
}
