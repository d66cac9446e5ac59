//! 命令执行错误定义

use crate::command::CommandStatus;
use crate::entity::{Dim, EntityId};
use crate::group::GroupError;
use crate::kernel::KernelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    /// 参数校验失败，此时尚未修改任何实体
    #[error("Validation error: {0}")]
    Validation(String),

    /// 执行过程中失败，已回滚
    #[error("Execution error: {0}")]
    Execution(String),

    /// 不应发生的内部错误
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Entity {id} has dimension {actual}, expected {expected}")]
    WrongDimension {
        id: EntityId,
        expected: Dim,
        actual: Dim,
    },

    #[error("Command {0} has already been previewed")]
    AlreadyPreviewed(String),

    #[error("Preview of command {name} failed: {source}")]
    PreviewFailed {
        name: String,
        #[source]
        source: Box<CommandError>,
    },

    #[error("Command {name} cannot {action} while {status:?}")]
    InvalidStatus {
        name: String,
        action: &'static str,
        status: CommandStatus,
    },

    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}

pub type Result<T> = std::result::Result<T, CommandError>;
