//! 命令执行上下文
//!
//! 持有名称管理器、实体管理器、分组管理器以及外部协作者（几何内核、网格管理器）。
//! 命令执行时以 `&mut Context` 访问它们。

use crate::config::ContextConfig;
use crate::entity::EntityId;
use crate::error::Result;
use crate::geom_manager::GeomManager;
use crate::group::{GroupHelper, GroupManager};
use crate::info_command::InfoCommand;
use crate::kernel::{GeomKernel, TransactionJournal};
use crate::mesh::{MeshManager, NullMeshManager};
use crate::name_manager::NameManager;
use tracing::debug;

/// 执行上下文
#[derive(Debug)]
pub struct Context {
    /// ID与名称分配
    pub names: NameManager,

    /// 几何实体
    pub geom: GeomManager,

    /// 分组
    pub groups: GroupManager,

    /// 几何内核事务
    pub kernel: Box<dyn GeomKernel>,

    /// 网格管理器
    pub mesh: Box<dyn MeshManager>,

    /// 配置
    pub config: ContextConfig,
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            names: NameManager::new(),
            geom: GeomManager::new(),
            groups: GroupManager::new(),
            kernel: Box::new(TransactionJournal::new()),
            mesh: Box::new(NullMeshManager),
            config,
        }
    }

    /// 使用指定的几何内核
    pub fn with_kernel(mut self, kernel: Box<dyn GeomKernel>) -> Self {
        self.kernel = kernel;
        self
    }

    /// 使用指定的网格管理器
    pub fn with_mesh(mut self, mesh: Box<dyn MeshManager>) -> Self {
        self.mesh = mesh;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.config.tolerance
    }

    /// 分组操作，变更记录到 `info`
    pub fn group_helper<'a>(&'a mut self, info: &'a mut InfoCommand) -> GroupHelper<'a> {
        GroupHelper::new(&mut self.geom, &mut self.groups, &mut *self.mesh, info)
    }

    /// 物理删除实体，同时从它所属的分组中移除
    pub fn purge_entity(&mut self, id: EntityId) -> Result<()> {
        let entity = self.geom.remove_entity(id)?;
        self.groups.forget_entity(id, &entity.groups);
        debug!("Purged {} ({})", entity.name, id);
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
