//! 命令：执行、撤销、重做与预览
//!
//! 每个用户操作封装为一个命令，生命周期为：
//! - `Init` → `execute()` → `Processing` → `Done` 或 `Canceled`
//! - `Done` 状态下 `undo()` 进入"已撤销"子状态，`redo()` 回到 `Done`
//! - 在 `Init` 状态下可以预览一次，预览不留下任何痕迹
//!
//! 撤销和重做不重新运行几何算法，只互换变更记录中的创建/删除标记
//! （见 [`InfoCommand::perm_created_deleted`]）。

pub mod create_geom;
pub mod edit_geom;
pub mod group_name;
pub mod manager;

use crate::context::Context;
use crate::display::DisplayRepresentation;
use crate::entity::Dim;
use crate::error::{CommandError, Result};
use crate::group::GroupSnapshot;
use crate::info_command::{ChangeKind, InfoCommand};
use crate::name_manager::NameSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// 命令状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    /// 已创建，尚未执行
    Init,
    /// 执行中
    Processing,
    /// 执行成功
    Done,
    /// 执行失败，已回滚
    Canceled,
}

/// 命名的、引用计数的互斥锁，串行化同一命令的撤销和重做
///
/// 命令自身通过 `&mut self` 调用时不会竞争；克隆出的句柄可以交给其他线程
/// （如读取实体做显示的线程），持锁期间该命令的撤销和重做会等待。
#[derive(Debug, Clone)]
pub struct CommandMutex {
    name: String,
    inner: Arc<Mutex<()>>,
}

impl CommandMutex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 持有该锁的引用数
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.inner
            .lock()
            .map_err(|_| CommandError::Internal(format!("mutex {} is poisoned", self.name)))
    }
}

/// 所有命令共有的状态
#[derive(Debug)]
pub struct CommandCore {
    /// 命令名称
    name: String,

    /// 唯一名称
    unique_name: String,

    status: CommandStatus,

    /// 是否处于已撤销子状态
    undone: bool,

    /// 是否已经预览过
    previewed: bool,

    /// 是否正在预览
    preview_mode: bool,

    /// 变更记录
    pub info: InfoCommand,

    mutex: CommandMutex,

    /// 执行前后的名称管理器快照
    names_before: Option<NameSnapshot>,
    names_after: Option<NameSnapshot>,

    /// 执行前的分组ID分配状态
    groups_before: Option<GroupSnapshot>,

    /// 最后一次失败的原因
    error_message: Option<String>,

    warnings: Vec<String>,
}

impl CommandCore {
    pub fn new(name: impl Into<String>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let name = name.into();
        let unique_name = format!("{}_{}", name, NEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            mutex: CommandMutex::new(format!("{unique_name}_mutex")),
            name,
            unique_name,
            status: CommandStatus::Init,
            undone: false,
            previewed: false,
            preview_mode: false,
            info: InfoCommand::new(),
            names_before: None,
            names_after: None,
            groups_before: None,
            error_message: None,
            warnings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn is_undone(&self) -> bool {
        self.undone
    }

    pub fn is_previewed(&self) -> bool {
        self.previewed
    }

    pub fn is_preview_mode(&self) -> bool {
        self.preview_mode
    }

    pub fn mutex(&self) -> &CommandMutex {
        &self.mutex
    }

    pub fn names_before(&self) -> Option<NameSnapshot> {
        self.names_before
    }

    pub fn names_after(&self) -> Option<NameSnapshot> {
        self.names_after
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        warn!("{}: {}", self.unique_name, warning);
        self.warnings.push(warning);
    }

    fn invalid_status(&self, action: &'static str) -> CommandError {
        CommandError::InvalidStatus {
            name: self.unique_name.clone(),
            action,
            status: self.status,
        }
    }
}

/// 预览收集的实体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewKind {
    /// 新建的顶点
    Vertices,
    /// 新建的曲线、曲面和体
    Objects,
}

/// 可撤销的命令
pub trait Command: Send {
    fn core(&self) -> &CommandCore;
    fn core_mut(&mut self) -> &mut CommandCore;

    /// 执行具体操作；每个新建实体都要记为 `Created`，每个作废实体记为 `Deleted`
    fn internal_execute(&mut self, ctx: &mut Context) -> Result<()>;

    /// 开启内核事务（预览时不开启）
    fn pre_execute(&mut self, ctx: &mut Context) -> Result<()> {
        if !self.core().preview_mode {
            ctx.kernel.begin_transaction(self.core().unique_name())?;
        }
        Ok(())
    }

    /// 根据执行结果提交或放弃内核事务；失败时先回滚
    fn post_execute(&mut self, ctx: &mut Context, has_error: bool) {
        if has_error {
            self.rollback(ctx);
        }
        if self.core().preview_mode {
            return;
        }
        let outcome = if has_error {
            ctx.kernel.abort_transaction()
        } else {
            ctx.kernel.commit_transaction()
        };
        if let Err(err) = outcome {
            error!("{}: kernel transaction: {}", self.core().unique_name(), err);
        }
    }

    /// 撤销失败执行的所有效果
    fn rollback(&mut self, ctx: &mut Context) {
        rollback_ledger(&mut self.core_mut().info, ctx);
    }

    fn internal_undo(&mut self, ctx: &mut Context) -> Result<()> {
        if !self.core().preview_mode {
            ctx.kernel.undo()?;
        }
        self.core_mut()
            .info
            .perm_created_deleted(&mut ctx.geom, &mut ctx.groups)
    }

    fn internal_redo(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.kernel.redo()?;
        self.core_mut()
            .info
            .perm_created_deleted(&mut ctx.geom, &mut ctx.groups)
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn status(&self) -> CommandStatus {
        self.core().status()
    }

    /// 执行命令
    ///
    /// 失败时所有已创建的实体被删除、内核事务被放弃、名称管理器恢复，
    /// 状态变为 `Canceled` 并返回错误。
    fn execute(&mut self, ctx: &mut Context) -> Result<CommandStatus> {
        let status = self.core().status;
        if !matches!(status, CommandStatus::Init | CommandStatus::Canceled) {
            return Err(self.core().invalid_status("execute"));
        }

        let names_before = ctx.names.checkpoint();
        let groups_before = ctx.groups.checkpoint();
        {
            let core = self.core_mut();
            core.info.clear();
            core.status = CommandStatus::Processing;
            core.names_before = Some(names_before);
            core.groups_before = Some(groups_before);
            core.error_message = None;
            info!("Executing {}", core.unique_name);
        }

        if let Err(err) = self.pre_execute(ctx) {
            let core = self.core_mut();
            core.status = CommandStatus::Canceled;
            core.error_message = Some(err.to_string());
            return Err(err);
        }

        match self.internal_execute(ctx) {
            Ok(()) => {
                let core = self.core_mut();
                ctx.groups.update_deleted_groups(&mut core.info);
                core.status = CommandStatus::Done;
                self.post_execute(ctx, false);
                let core = self.core_mut();
                core.names_after = Some(ctx.names.checkpoint());
                info!(
                    "{} done ({} ledger rows)",
                    core.unique_name,
                    core.info.nb_geom_info_entities()
                );
                Ok(CommandStatus::Done)
            }
            Err(err) => {
                warn!("{} failed: {}", self.core().unique_name(), err);
                self.post_execute(ctx, true);
                ctx.names.restore(names_before);
                ctx.groups.restore(groups_before);
                let core = self.core_mut();
                core.status = CommandStatus::Canceled;
                core.error_message = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// 撤销
    fn undo(&mut self, ctx: &mut Context) -> Result<()> {
        let mutex = self.core().mutex.clone();
        let _guard = mutex.lock()?;
        let core = self.core();
        if core.status != CommandStatus::Done || core.undone {
            return Err(core.invalid_status("undo"));
        }
        self.internal_undo(ctx)?;
        let core = self.core_mut();
        core.undone = true;
        info!("Undone {}", core.unique_name);
        Ok(())
    }

    /// 重做
    fn redo(&mut self, ctx: &mut Context) -> Result<()> {
        let mutex = self.core().mutex.clone();
        let _guard = mutex.lock()?;
        let core = self.core();
        if core.status != CommandStatus::Done || !core.undone {
            return Err(core.invalid_status("redo"));
        }
        self.internal_redo(ctx)?;
        let core = self.core_mut();
        core.undone = false;
        info!("Redone {}", core.unique_name);
        Ok(())
    }

    /// 预览新建的顶点
    fn preview_new_vertices(&mut self, ctx: &mut Context) -> Result<DisplayRepresentation> {
        preview(self, ctx, PreviewKind::Vertices)
    }

    /// 预览新建的曲线、曲面和体
    fn preview_new_objects(&mut self, ctx: &mut Context) -> Result<DisplayRepresentation> {
        preview(self, ctx, PreviewKind::Objects)
    }

    /// 丢弃命令
    ///
    /// 物理删除仍标记为 `Deleted` 的实体和分组；已撤销的命令还会把
    /// 名称管理器恢复到执行前，使它分配过的ID可以被重新使用。
    fn discard(&mut self, ctx: &mut Context) {
        let core = self.core_mut();
        discard_deleted(&core.info, ctx);
        if core.status == CommandStatus::Done && core.undone {
            if let Some(snapshot) = core.names_before {
                ctx.names.restore(snapshot);
            }
            if let Some(snapshot) = core.groups_before {
                ctx.groups.restore(snapshot);
            }
        }
        core.info.clear();
    }
}

/// 预览：执行、收集、撤销，并恢复名称管理器
fn preview<C: Command + ?Sized>(
    cmd: &mut C,
    ctx: &mut Context,
    kind: PreviewKind,
) -> Result<DisplayRepresentation> {
    if cmd.core().previewed {
        return Err(CommandError::AlreadyPreviewed(
            cmd.core().unique_name().to_string(),
        ));
    }
    if cmd.core().status != CommandStatus::Init {
        return Err(cmd.core().invalid_status("preview"));
    }

    let snapshot = ctx.names.checkpoint();
    let groups_snapshot = ctx.groups.checkpoint();
    {
        let core = cmd.core_mut();
        core.previewed = true;
        core.preview_mode = true;
        core.info.clear();
    }

    let outcome = cmd.internal_execute(ctx);
    let has_error = outcome.is_err() || cmd.core().status == CommandStatus::Canceled;
    cmd.post_execute(ctx, has_error);
    if let Err(err) = outcome {
        ctx.names.restore(snapshot);
        ctx.groups.restore(groups_snapshot);
        cmd.core_mut().preview_mode = false;
        return Err(CommandError::PreviewFailed {
            name: cmd.core().unique_name().to_string(),
            source: Box::new(err),
        });
    }

    let mut rep = DisplayRepresentation::new();
    for row in cmd.core().info.geom_info_entities() {
        if row.kind != ChangeKind::Created {
            continue;
        }
        let wanted = match kind {
            PreviewKind::Vertices => row.dim == Dim::Vertex,
            PreviewKind::Objects => row.dim != Dim::Vertex,
        };
        if wanted {
            if let Err(err) = ctx.geom.representation(row.entity, &mut rep) {
                error!("preview of {}: {}", row.entity, err);
            }
        }
    }

    let unwound = cmd.internal_undo(ctx);
    let core = cmd.core_mut();
    discard_deleted(&core.info, ctx);
    core.info.clear();
    core.preview_mode = false;
    ctx.names.restore(snapshot);
    ctx.groups.restore(groups_snapshot);
    unwound?;
    Ok(rep)
}

/// 物理删除记录中标记为 `Deleted` 的实体，以及已销毁且为空的 `Deleted` 分组
///
/// 单个实体失败时记录错误并继续处理其余行。
pub(crate) fn discard_deleted(info: &InfoCommand, ctx: &mut Context) {
    let mut purged = BTreeSet::new();
    for row in info.geom_info_entities() {
        if row.kind != ChangeKind::Deleted || !purged.insert(row.entity) {
            continue;
        }
        if let Err(err) = ctx.purge_entity(row.entity) {
            error!("cleanup of {}: {}", row.entity, err);
        }
    }

    for (group, kind) in info.group_info_entities() {
        if *kind != ChangeKind::Deleted {
            continue;
        }
        let removable = ctx
            .groups
            .group(*group)
            .is_some_and(|g| g.destroyed && g.is_empty());
        if removable {
            ctx.groups.delete_group(*group);
        }
    }
}

/// 回滚：互换标记后删除原本新建的实体，清空记录
pub(crate) fn rollback_ledger(info: &mut InfoCommand, ctx: &mut Context) {
    if let Err(err) = info.perm_created_deleted(&mut ctx.geom, &mut ctx.groups) {
        error!("rollback: {}", err);
    }
    discard_deleted(info, ctx);
    info.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, GeomEntity, Shape, Vertex};
    use crate::kernel::{GeomKernel, KernelError};
    use crate::math::Point3;

    /// 创建若干顶点，可在最后失败
    struct Points {
        core: CommandCore,
        count: usize,
        fail: bool,
    }

    impl Points {
        fn new(count: usize, fail: bool) -> Self {
            Self {
                core: CommandCore::new("Points"),
                count,
                fail,
            }
        }
    }

    impl Command for Points {
        fn core(&self) -> &CommandCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut CommandCore {
            &mut self.core
        }

        fn internal_execute(&mut self, ctx: &mut Context) -> Result<()> {
            for i in 0..self.count {
                let (id, name) = ctx.names.allocate(Dim::Vertex);
                let shape = Shape::Vertex(Vertex {
                    point: Point3::new(i as f64, 0.0, 0.0),
                    curves: Vec::new(),
                });
                ctx.geom.add_entity(GeomEntity::new(id, name, shape))?;
                self.core
                    .info
                    .add_geom_info_entity(id, Dim::Vertex, ChangeKind::Created);
            }
            if self.fail {
                return Err(CommandError::Execution("requested failure".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenKernel;

    impl GeomKernel for BrokenKernel {
        fn begin_transaction(&mut self, _label: &str) -> std::result::Result<(), KernelError> {
            Err(KernelError::NoOpenTransaction)
        }
        fn commit_transaction(&mut self) -> std::result::Result<(), KernelError> {
            Ok(())
        }
        fn abort_transaction(&mut self) -> std::result::Result<(), KernelError> {
            Ok(())
        }
        fn undo(&mut self) -> std::result::Result<(), KernelError> {
            Ok(())
        }
        fn redo(&mut self) -> std::result::Result<(), KernelError> {
            Ok(())
        }
    }

    #[test]
    fn test_execute_undo_redo() {
        let mut ctx = Context::new();
        let mut cmd = Points::new(3, false);
        assert_eq!(cmd.status(), CommandStatus::Init);

        assert_eq!(cmd.execute(&mut ctx).unwrap(), CommandStatus::Done);
        let ids = ctx.geom.vertices();
        assert_eq!(ids.len(), 3);

        cmd.undo(&mut ctx).unwrap();
        assert!(cmd.core().is_undone());
        assert_eq!(cmd.status(), CommandStatus::Done);
        assert!(ctx.geom.vertices().is_empty());
        assert!(cmd.undo(&mut ctx).is_err());

        cmd.redo(&mut ctx).unwrap();
        assert_eq!(ctx.geom.vertices(), ids);
        assert!(cmd.redo(&mut ctx).is_err());
        assert!(cmd.execute(&mut ctx).is_err());
    }

    #[test]
    fn test_failed_execute_rolls_back() {
        let mut ctx = Context::new();
        let next = ctx.names.next_id();
        let mut cmd = Points::new(2, true);

        let err = cmd.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, CommandError::Execution(_)));
        assert_eq!(cmd.status(), CommandStatus::Canceled);
        assert!(cmd.core().error_message().is_some());
        assert_eq!(ctx.geom.nb_stored(), 0);
        assert_eq!(ctx.names.next_id(), next);
        assert!(cmd.core().info.is_empty());
        assert!(cmd.undo(&mut ctx).is_err());
    }

    #[test]
    fn test_kernel_failure_cancels() {
        let mut ctx = Context::new().with_kernel(Box::new(BrokenKernel));
        let mut cmd = Points::new(1, false);
        assert!(matches!(cmd.execute(&mut ctx), Err(CommandError::Kernel(_))));
        assert_eq!(cmd.status(), CommandStatus::Canceled);
        assert_eq!(ctx.geom.nb_stored(), 0);
    }

    #[test]
    fn test_preview_once() {
        let mut ctx = Context::new();
        let mut cmd = Points::new(2, false);

        let rep = cmd.preview_new_vertices(&mut ctx).unwrap();
        assert_eq!(rep.points.len(), 2);
        assert_eq!(ctx.geom.nb_stored(), 0);
        assert_eq!(ctx.names.next_id(), EntityId::from_raw(1));

        assert!(matches!(
            cmd.preview_new_objects(&mut ctx),
            Err(CommandError::AlreadyPreviewed(_))
        ));

        // 预览后仍可执行，得到与预览相同的ID
        cmd.execute(&mut ctx).unwrap();
        assert_eq!(ctx.geom.vertices()[0], EntityId::from_raw(1));
    }

    #[test]
    fn test_failed_preview() {
        let mut ctx = Context::new();
        let mut cmd = Points::new(2, true);
        let err = cmd.preview_new_vertices(&mut ctx).unwrap_err();
        assert!(matches!(err, CommandError::PreviewFailed { .. }));
        assert_eq!(ctx.geom.nb_stored(), 0);
        assert_eq!(ctx.names.next_id(), EntityId::from_raw(1));
    }

    #[test]
    fn test_discard_undone_restores_names() {
        let mut ctx = Context::new();
        let mut cmd = Points::new(2, false);
        cmd.execute(&mut ctx).unwrap();
        cmd.undo(&mut ctx).unwrap();

        cmd.discard(&mut ctx);
        assert_eq!(ctx.geom.nb_stored(), 0);
        assert_eq!(ctx.names.next_id(), EntityId::from_raw(1));
    }

    #[test]
    fn test_cleanup_continues_past_missing_entity() {
        let mut ctx = Context::new();
        let mut cmd = Points::new(2, false);
        cmd.execute(&mut ctx).unwrap();
        let ids = ctx.geom.vertices();
        // 第一个实体在命令之外被物理删除
        ctx.purge_entity(ids[0]).unwrap();

        assert!(cmd.undo(&mut ctx).is_err());
        assert!(ctx.geom.entity(ids[1]).unwrap().destroyed);

        cmd.discard(&mut ctx);
        assert_eq!(ctx.geom.nb_stored(), 0);
    }

    #[test]
    fn test_mutex_is_shared() {
        let cmd = Points::new(0, false);
        let mutex = cmd.core().mutex().clone();
        assert_eq!(mutex.ref_count(), 2);
        assert!(mutex.name().starts_with("Points_"));
        drop(mutex.lock().unwrap());
    }

    #[test]
    fn test_mutex_holder_blocks_undo() {
        use std::sync::mpsc;
        use std::time::Duration;

        let mut ctx = Context::new();
        let mut cmd = Points::new(1, false);
        cmd.execute(&mut ctx).unwrap();

        let handle = cmd.core().mutex().clone();
        let guard = handle.lock().unwrap();
        let (tx, rx) = mpsc::channel();
        let worker = std::thread::spawn(move || {
            cmd.undo(&mut ctx).unwrap();
            tx.send(()).unwrap();
            ctx
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let ctx = worker.join().unwrap();
        assert!(ctx.geom.vertices().is_empty());
    }
}
