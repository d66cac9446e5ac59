//! MGX 命令行程序
//! 读取会话配置，运行一段建模脚本并输出每一步后的实体统计

use anyhow::{Context as _, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mgx_core::prelude::*;

/// 各维度未销毁的实体数
fn log_counts(step: &str, ctx: &Context) {
    info!(
        "{:<12} vertices={} curves={} surfaces={} volumes={}",
        step,
        ctx.geom.nb(Dim::Vertex),
        ctx.geom.nb(Dim::Curve),
        ctx.geom.nb(Dim::Surface),
        ctx.geom.nb(Dim::Volume),
    );
}

fn square(x: f64, y: f64, size: f64) -> Vec<Point3> {
    vec![
        Point3::new(x, y, 0.0),
        Point3::new(x + size, y, 0.0),
        Point3::new(x + size, y + size, 0.0),
        Point3::new(x, y + size, 0.0),
    ]
}

/// 新建一个平面多边形，返回它的ID
fn new_surface(
    manager: &mut CommandManager,
    ctx: &mut Context,
    points: Vec<Point3>,
    group: &str,
) -> Result<EntityId> {
    manager.run(Box::new(CommandNewPlanarSurface::new(ctx, points, group)?), ctx)?;
    ctx.geom
        .surfaces()
        .last()
        .copied()
        .context("surface was not created")
}

fn run_session(ctx: &mut Context) -> Result<()> {
    let mut manager = CommandManager::from_context(ctx);

    let new_box = CommandNewBox::new(ctx, Point3::origin(), Point3::new(2.0, 1.0, 1.0), "Solids")?;
    manager.run(Box::new(new_box), ctx)?;
    log_counts("box", ctx);

    let floor = new_surface(&mut manager, ctx, square(5.0, 0.0, 1.0), "Floor")?;
    let mut prism = CommandNewPrism::new(ctx, vec![floor], Vector3::new(0.0, 0.0, 3.0), "")?;
    let preview = prism.preview_new_objects(ctx)?;
    info!(
        "Prism preview: {} points, {} segments",
        preview.points.len(),
        preview.nb_segments()
    );
    manager.run(Box::new(prism), ctx)?;
    log_counts("prism", ctx);

    let wall = new_surface(&mut manager, ctx, square(10.0, 0.0, 1.0), "")?;
    let extrusion = CommandExtrusion::new(ctx, vec![wall], Vector3::new(0.0, 0.0, 2.0), false, "Walls")?;
    manager.run(Box::new(extrusion), ctx)?;
    log_counts("extrusion", ctx);

    let block = ctx
        .geom
        .volumes()
        .first()
        .copied()
        .context("no volume to cut")?;
    let plane = Plane::new(Point3::new(1.0, 0.0, 0.0), Vector3::x()).context("null plane normal")?;
    manager.run(Box::new(CommandSectionByPlane::new(ctx, vec![block], plane, "Cut")?), ctx)?;
    log_counts("section", ctx);

    let sheet = new_surface(&mut manager, ctx, square(0.0, 5.0, 2.0), "Sheets")?;
    let edges = ctx.geom.surface(sheet)?.curves.clone();
    manager.run(Box::new(CommandJoinCurves::new(ctx, edges[..2].to_vec(), "")?), ctx)?;
    log_counts("join", ctx);

    manager.undo(ctx)?;
    log_counts("undo", ctx);
    manager.redo(ctx)?;
    log_counts("redo", ctx);

    let stats = manager.stats();
    info!(
        "History: {:?} (executed={}, undone={}, redone={}, failed={})",
        manager.history(),
        stats.executed,
        stats.undone,
        stats.redone,
        stats.failed
    );
    Ok(())
}

fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "mgx.json".to_string());
    let config = ContextConfig::load(&path).with_context(|| format!("loading {path}"))?;
    let level: Level = config.log_level.parse().unwrap_or(Level::INFO);

    // 初始化日志
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(level).finish())?;

    info!("Starting MGX (undo depth {})", config.undo_depth);
    let mut ctx = Context::with_config(config);
    run_session(&mut ctx)?;
    Ok(())
}
