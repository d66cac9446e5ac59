//! MGX 核心：可撤销的几何建模命令
//!
//! 提供命令的执行、撤销、重做和预览，以及命令对几何拓扑和分组的修改记录。
//!
//! # 架构设计
//!
//! - `Context`: 会话状态（实体、分组、名称分配器、内核与网格钩子）
//! - `Command`: 命令生命周期，修改记录在 `InfoCommand` 中
//! - `CommandManager`: 撤销/重做栈
//! - `ops`: 具体的几何操作（棱柱、拉伸、剖切、曲线合并等）
//!
//! 撤销通过交换修改前后的实体形状并翻转修改记录完成，
//! 重做执行同样的交换，因此撤销和重做是同一个对合操作。
//!
//! # 示例
//!
//! ```rust
//! use mgx_core::prelude::*;
//!
//! let mut ctx = Context::new();
//! let mut manager = CommandManager::from_context(&ctx);
//!
//! let square = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let cmd = CommandNewPlanarSurface::new(&ctx, square, "Floor").unwrap();
//! manager.run(Box::new(cmd), &mut ctx).unwrap();
//!
//! let surface = ctx.geom.surfaces()[0];
//! let prism = CommandNewPrism::new(&ctx, vec![surface], Vector3::z(), "").unwrap();
//! manager.run(Box::new(prism), &mut ctx).unwrap();
//! assert_eq!(ctx.geom.nb(Dim::Volume), 1);
//!
//! manager.undo(&mut ctx).unwrap();
//! assert_eq!(ctx.geom.nb(Dim::Volume), 0);
//! ```

pub mod command;
pub mod config;
pub mod context;
pub mod display;
pub mod entity;
pub mod error;
pub mod geom_manager;
pub mod group;
pub mod info_command;
pub mod kernel;
pub mod math;
pub mod mesh;
pub mod name_manager;
pub mod ops;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::command::group_name::{CommandAddRemoveGroupName, GroupEditKind};
    pub use crate::command::manager::CommandManager;
    pub use crate::command::{Command, CommandStatus};
    pub use crate::config::ContextConfig;
    pub use crate::context::Context;
    pub use crate::entity::{Dim, EntityId};
    pub use crate::error::{CommandError, Result};
    pub use crate::info_command::{ChangeKind, InfoCommand};
    pub use crate::math::{Plane, Point3, Vector3};
    pub use crate::ops::{
        CommandExtrusion, CommandJoinCurves, CommandNewBox, CommandNewPlanarSurface,
        CommandNewPrism, CommandNewSegment, CommandNewVertex, CommandSectionByPlane,
    };
}
