//! 命令管理器
//!
//! 串行执行命令并维护撤销/重做栈：
//! - 执行新命令前丢弃重做栈，成功执行的命令压入撤销栈
//! - 撤销栈超过 `undo_depth` 时丢弃最早的命令
//! - 被丢弃的命令调用 `discard()` 释放它标记为删除的实体

use super::{Command, CommandStatus};
use crate::context::Context;
use crate::error::Result;
use std::collections::VecDeque;
use tracing::{debug, info};

/// 命令统计
#[derive(Debug, Clone, Default)]
pub struct CommandStats {
    /// 成功执行的命令数
    pub executed: usize,

    /// 失败的命令数
    pub failed: usize,

    /// 撤销次数
    pub undone: usize,

    /// 重做次数
    pub redone: usize,

    /// 被丢弃的命令数
    pub discarded: usize,
}

/// 命令管理器
pub struct CommandManager {
    /// 已执行的命令，最新的在末尾
    done: VecDeque<Box<dyn Command>>,

    /// 已撤销的命令，最近撤销的在末尾
    undone: Vec<Box<dyn Command>>,

    /// 撤销栈上限
    undo_depth: usize,

    stats: CommandStats,
}

impl CommandManager {
    pub fn new(undo_depth: usize) -> Self {
        Self {
            done: VecDeque::new(),
            undone: Vec::new(),
            undo_depth: undo_depth.max(1),
            stats: CommandStats::default(),
        }
    }

    /// 使用上下文配置的撤销深度
    pub fn from_context(ctx: &Context) -> Self {
        Self::new(ctx.config.undo_depth)
    }

    /// 执行命令，成功后记入历史
    ///
    /// 执行前丢弃重做栈，使已撤销命令分配过的ID可以被重新使用。
    /// 失败的命令已经回滚，不会进入历史。
    pub fn run(&mut self, mut command: Box<dyn Command>, ctx: &mut Context) -> Result<CommandStatus> {
        self.discard_redo_stack(ctx);
        match command.execute(ctx) {
            Ok(status) => {
                self.stats.executed += 1;
                self.done.push_back(command);
                while self.done.len() > self.undo_depth {
                    if let Some(mut oldest) = self.done.pop_front() {
                        debug!("Dropping {} from history", oldest.core().unique_name());
                        oldest.discard(ctx);
                        self.stats.discarded += 1;
                    }
                }
                Ok(status)
            }
            Err(err) => {
                self.stats.failed += 1;
                command.discard(ctx);
                Err(err)
            }
        }
    }

    /// 撤销最近的命令，历史为空时返回 `Ok(false)`
    pub fn undo(&mut self, ctx: &mut Context) -> Result<bool> {
        let Some(mut command) = self.done.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = command.undo(ctx) {
            self.done.push_back(command);
            return Err(err);
        }
        info!("Undo {}", command.name());
        self.stats.undone += 1;
        self.undone.push(command);
        Ok(true)
    }

    /// 重做最近撤销的命令，没有可重做的命令时返回 `Ok(false)`
    pub fn redo(&mut self, ctx: &mut Context) -> Result<bool> {
        let Some(mut command) = self.undone.pop() else {
            return Ok(false);
        };
        if let Err(err) = command.redo(ctx) {
            self.undone.push(command);
            return Err(err);
        }
        info!("Redo {}", command.name());
        self.stats.redone += 1;
        self.done.push_back(command);
        Ok(true)
    }

    /// 丢弃所有已撤销的命令，最后执行的先丢弃
    fn discard_redo_stack(&mut self, ctx: &mut Context) {
        for mut command in self.undone.drain(..) {
            command.discard(ctx);
            self.stats.discarded += 1;
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn nb_done(&self) -> usize {
        self.done.len()
    }

    pub fn nb_undone(&self) -> usize {
        self.undone.len()
    }

    /// 可撤销命令的名称，最早的在前
    pub fn history(&self) -> Vec<String> {
        self.done
            .iter()
            .map(|c| c.core().unique_name().to_string())
            .collect()
    }

    pub fn stats(&self) -> &CommandStats {
        &self.stats
    }

    /// 丢弃全部历史
    pub fn clear(&mut self, ctx: &mut Context) {
        self.discard_redo_stack(ctx);
        while let Some(mut command) = self.done.pop_back() {
            command.discard(ctx);
            self.stats.discarded += 1;
        }
    }
}
