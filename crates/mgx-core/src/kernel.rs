//! 几何内核事务边界
//!
//! 几何内核本身不在本库中。命令只通过 `GeomKernel` 在执行前开启事务，
//! 成功后提交、失败后放弃，并在撤销/重做时让内核回退或重放最后一个事务。

use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// 内核事务错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    #[error("A transaction is already open: {0}")]
    TransactionAlreadyOpen(String),

    #[error("No open transaction")]
    NoOpenTransaction,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

/// 几何内核事务接口
pub trait GeomKernel: Debug + Send {
    fn begin_transaction(&mut self, label: &str) -> Result<(), KernelError>;
    fn commit_transaction(&mut self) -> Result<(), KernelError>;
    fn abort_transaction(&mut self) -> Result<(), KernelError>;
    fn undo(&mut self) -> Result<(), KernelError>;
    fn redo(&mut self) -> Result<(), KernelError>;
}

/// 记录事务历史的内核实现
#[derive(Debug, Default, Clone)]
pub struct TransactionJournal {
    /// 当前打开的事务
    open: Option<String>,

    /// 已提交的事务，可撤销
    committed: Vec<String>,

    /// 已撤销的事务，可重做
    undone: Vec<String>,

    /// 放弃的事务数
    aborted: usize,
}

impl TransactionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_transaction(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn committed(&self) -> &[String] {
        &self.committed
    }

    pub fn undone(&self) -> &[String] {
        &self.undone
    }

    pub fn nb_aborted(&self) -> usize {
        self.aborted
    }
}

impl GeomKernel for TransactionJournal {
    fn begin_transaction(&mut self, label: &str) -> Result<(), KernelError> {
        if let Some(open) = &self.open {
            return Err(KernelError::TransactionAlreadyOpen(open.clone()));
        }
        debug!("Kernel transaction opened: {}", label);
        self.open = Some(label.to_string());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), KernelError> {
        let label = self.open.take().ok_or(KernelError::NoOpenTransaction)?;
        self.committed.push(label);
        self.undone.clear();
        Ok(())
    }

    fn abort_transaction(&mut self) -> Result<(), KernelError> {
        let label = self.open.take().ok_or(KernelError::NoOpenTransaction)?;
        debug!("Kernel transaction aborted: {}", label);
        self.aborted += 1;
        Ok(())
    }

    fn undo(&mut self) -> Result<(), KernelError> {
        let label = self.committed.pop().ok_or(KernelError::NothingToUndo)?;
        self.undone.push(label);
        Ok(())
    }

    fn redo(&mut self) -> Result<(), KernelError> {
        let label = self.undone.pop().ok_or(KernelError::NothingToRedo)?;
        self.committed.push(label);
        Ok(())
    }
}
