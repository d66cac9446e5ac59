//! 命令模型的整体性质：撤销/重做、预览、分组迁移与回滚

use mgx_core::command::create_geom::{CommandCreateGeom, GeomOperation, GeomScope};
use mgx_core::group::{GroupEntity, GroupId, GroupManager};
use mgx_core::prelude::*;

fn square_points(x: f64) -> Vec<Point3> {
    vec![
        Point3::new(x, 0.0, 0.0),
        Point3::new(x + 1.0, 0.0, 0.0),
        Point3::new(x + 1.0, 1.0, 0.0),
        Point3::new(x, 1.0, 0.0),
    ]
}

fn square(ctx: &mut Context, x: f64, group: &str) -> EntityId {
    let mut cmd = CommandNewPlanarSurface::new(ctx, square_points(x), group).unwrap();
    cmd.execute(ctx).unwrap();
    *cmd.created_entities().last().unwrap()
}

fn group_names(ctx: &mut Context, id: EntityId) -> Vec<String> {
    ctx.group_helper(&mut InfoCommand::new()).group_names(id).unwrap()
}

fn counts(ctx: &Context) -> [usize; 4] {
    [
        ctx.geom.nb(Dim::Vertex),
        ctx.geom.nb(Dim::Curve),
        ctx.geom.nb(Dim::Surface),
        ctx.geom.nb(Dim::Volume),
    ]
}

#[test]
fn test_ledger_flip_twice_is_identity() {
    let mut ctx = Context::new();
    let mut cmd =
        CommandNewBox::new(&ctx, Point3::origin(), Point3::new(1.0, 1.0, 1.0), "Solids").unwrap();
    cmd.execute(&mut ctx).unwrap();

    let mut info = cmd.core().info.clone();
    let rows = info.geom_info_entities().to_vec();
    let groups = info.group_info_entities().clone();

    info.perm_created_deleted(&mut ctx.geom, &mut ctx.groups).unwrap();
    assert_eq!(ctx.geom.nb(Dim::Volume), 0);
    assert!(info
        .geom_info_entities()
        .iter()
        .all(|row| row.kind != ChangeKind::Created));

    info.perm_created_deleted(&mut ctx.geom, &mut ctx.groups).unwrap();
    assert_eq!(info.geom_info_entities(), rows.as_slice());
    assert_eq!(info.group_info_entities(), &groups);
    assert_eq!(ctx.geom.nb(Dim::Volume), 1);
}

#[test]
fn test_undo_redo_keeps_ids() {
    let mut ctx = Context::new();
    let mut manager = CommandManager::from_context(&ctx);
    let cmd = CommandNewBox::new(&ctx, Point3::origin(), Point3::new(2.0, 1.0, 1.0), "").unwrap();
    manager.run(Box::new(cmd), &mut ctx).unwrap();

    let before: Vec<Vec<EntityId>> = [Dim::Vertex, Dim::Curve, Dim::Surface, Dim::Volume]
        .into_iter()
        .map(|dim| ctx.geom.entities(dim))
        .collect();
    let names: Vec<String> = before[3].iter().map(|id| ctx.geom.name_of(*id)).collect();

    assert!(manager.undo(&mut ctx).unwrap());
    assert_eq!(counts(&ctx), [0, 0, 0, 0]);
    assert!(ctx.geom.volumes().is_empty());

    assert!(manager.redo(&mut ctx).unwrap());
    let after: Vec<Vec<EntityId>> = [Dim::Vertex, Dim::Curve, Dim::Surface, Dim::Volume]
        .into_iter()
        .map(|dim| ctx.geom.entities(dim))
        .collect();
    assert_eq!(before, after);
    let renamed: Vec<String> = after[3].iter().map(|id| ctx.geom.name_of(*id)).collect();
    assert_eq!(names, renamed);
}

#[test]
fn test_preview_is_transparent() {
    let mut first = Context::new();
    let mut second = Context::new();
    let s1 = square(&mut first, 0.0, "");
    let s2 = square(&mut second, 0.0, "");
    assert_eq!(s1, s2);

    let mut a = CommandNewPrism::new(&first, vec![s1], Vector3::z(), "").unwrap();
    let mut b = CommandNewPrism::new(&second, vec![s2], Vector3::z(), "").unwrap();
    let next_id = first.names.next_id();

    let rep_a = a.preview_new_vertices(&mut first).unwrap();
    let rep_b = b.preview_new_vertices(&mut second).unwrap();
    assert_eq!(rep_a.points, rep_b.points);
    assert_eq!(rep_a.points.len(), 4);
    assert_eq!(first.names.next_id(), next_id);
    assert_eq!(first.geom.nb(Dim::Volume), 0);
    assert!(matches!(
        a.preview_new_objects(&mut first),
        Err(CommandError::AlreadyPreviewed(_))
    ));

    a.execute(&mut first).unwrap();
    let mut direct = CommandNewPrism::new(&second, vec![s2], Vector3::z(), "").unwrap();
    direct.execute(&mut second).unwrap();
    assert_eq!(a.created_entities(), direct.created_entities());
    assert_eq!(first.names.next_id(), second.names.next_id());
}

#[test]
fn test_default_group_migration() {
    let mut ctx = Context::new();
    let mut new_vertex = CommandNewVertex::new(&ctx, Point3::origin(), "").unwrap();
    new_vertex.execute(&mut ctx).unwrap();
    let v = new_vertex.created_entities()[0];
    assert_eq!(group_names(&mut ctx, v), vec![GroupManager::default_name(Dim::Vertex)]);

    let mut add =
        CommandAddRemoveGroupName::new(&ctx, vec![v], Dim::Vertex, "MyGroup", GroupEditKind::Add)
            .unwrap();
    add.execute(&mut ctx).unwrap();
    let entity = ctx.geom.entity(v).unwrap();
    assert_eq!(entity.nb_groups(), 1);
    let group = ctx.groups.group(entity.groups[0]).unwrap();
    assert!(!group.is_default);
    assert_eq!(group.name, "MyGroup");

    let mut remove = CommandAddRemoveGroupName::new(
        &ctx,
        vec![v],
        Dim::Vertex,
        "MyGroup",
        GroupEditKind::Remove,
    )
    .unwrap();
    remove.execute(&mut ctx).unwrap();
    assert_eq!(group_names(&mut ctx, v), vec![GroupManager::default_name(Dim::Vertex)]);
    assert_eq!(ctx.geom.entity(v).unwrap().nb_groups(), 1);
}

#[test]
fn test_prism_propagates_groups() {
    let mut ctx = Context::new();
    let plain = square(&mut ctx, 0.0, "");
    let custom = square(&mut ctx, 3.0, "Custom");
    let custom_2d = ctx.groups.get_group(Dim::Surface, "Custom", true).unwrap().unwrap();
    ctx.groups.group_mut(custom_2d).unwrap().level = 4;

    let mut cmd = CommandNewPrism::new(&ctx, vec![plain, custom], Vector3::z(), "").unwrap();
    cmd.execute(&mut ctx).unwrap();
    let op = cmd.operation();
    let (vol1, vol2) = (op.s2v[&plain], op.s2v[&custom]);

    assert_eq!(group_names(&mut ctx, vol1), vec!["Hors Groupe 3D"]);
    assert_eq!(group_names(&mut ctx, vol2), vec!["Custom"]);

    let mut all: Vec<String> = ctx
        .groups
        .groups(Dim::Volume)
        .into_iter()
        .filter(|g| !g.destroyed)
        .map(|g| g.name.clone())
        .collect();
    all.sort();
    assert_eq!(all, vec!["Custom", "Hors Groupe 3D"]);

    let custom_3d = ctx.groups.get_group(Dim::Volume, "Custom", true).unwrap().unwrap();
    assert_eq!(ctx.groups.group(custom_3d).unwrap().level, 4);
    let default_2d = ctx
        .groups
        .get_group(Dim::Surface, "Hors Groupe 2D", true)
        .unwrap()
        .unwrap();
    let default_3d = ctx
        .groups
        .get_group(Dim::Volume, "Hors Groupe 3D", true)
        .unwrap()
        .unwrap();
    assert_eq!(
        ctx.groups.group(default_3d).unwrap().level,
        ctx.groups.group(default_2d).unwrap().level
    );
}

#[test]
fn test_group_rejects_duplicate_member() {
    for (i, dim) in [Dim::Vertex, Dim::Curve, Dim::Surface, Dim::Volume].into_iter().enumerate() {
        let mut group = GroupEntity::new(GroupId(i as u64), "G", dim, false);
        let entity = EntityId::from_raw(7);
        group.add(entity).unwrap();
        assert!(group.add(entity).is_err());
        assert_eq!(group.nb(), 1);
    }
}

/// 保存几个顶点后失败的操作
struct Sabotage;

impl GeomOperation for Sabotage {
    fn name(&self) -> &'static str {
        "Sabotage"
    }

    fn execute(&mut self, scope: &mut GeomScope<'_>) -> Result<()> {
        let a = scope.store_vertex(Point3::new(10.0, 0.0, 0.0))?;
        let b = scope.store_vertex(Point3::new(11.0, 0.0, 0.0))?;
        let c = scope.store_segment(a, b)?;
        scope.add_to_group(c, false)?;
        Err(CommandError::Execution("sabotaged".to_string()))
    }
}

#[test]
fn test_failed_commands_leave_no_trace() {
    let mut ctx = Context::new();
    let s = square(&mut ctx, 0.0, "");
    let edges = ctx.geom.surface(s).unwrap().curves.clone();
    let before = counts(&ctx);
    let stored = ctx.geom.nb_stored();
    let next_id = ctx.names.next_id();
    let nb_groups = ctx.groups.nb_stored();

    let mut join = CommandJoinCurves::new(&ctx, vec![edges[0], edges[2]], "").unwrap();
    assert!(join.execute(&mut ctx).is_err());
    assert_eq!(join.status(), CommandStatus::Canceled);
    assert_eq!(counts(&ctx), before);
    assert_eq!(ctx.geom.surface(s).unwrap().curves, edges);

    let mut sabotage = CommandCreateGeom::with_operation(&ctx, Sabotage, "Broken").unwrap();
    let err = sabotage.execute(&mut ctx).unwrap_err();
    assert!(err.to_string().contains("sabotaged"));
    assert_eq!(counts(&ctx), before);
    assert_eq!(ctx.geom.nb_stored(), stored);
    assert_eq!(ctx.names.next_id(), next_id);
    assert_eq!(ctx.groups.nb_stored(), nb_groups);
    assert!(sabotage.created_entities().is_empty());
}

#[test]
fn test_cleanup_keeps_going_after_a_missing_entity() {
    let mut ctx = Context::new();
    let mut cmd =
        CommandNewBox::new(&ctx, Point3::origin(), Point3::new(1.0, 1.0, 1.0), "Solids").unwrap();
    cmd.execute(&mut ctx).unwrap();
    let created = cmd.created_entities().to_vec();
    let lost = ctx.geom.vertices()[0];
    ctx.purge_entity(lost).unwrap();

    let err = cmd.undo(&mut ctx).unwrap_err();
    assert!(matches!(err, CommandError::EntityNotFound(id) if id == lost));
    assert_eq!(counts(&ctx), [0, 0, 0, 0]);
    assert!(ctx.groups.get_group(Dim::Volume, "Solids", false).unwrap().is_none());

    cmd.discard(&mut ctx);
    for id in created {
        assert!(ctx.geom.get(id).is_none());
    }
    assert_eq!(ctx.geom.nb_stored(), 0);
}

#[test]
fn test_group_edit_undo_then_discard() {
    let mut ctx = Context::new();
    let mut manager = CommandManager::from_context(&ctx);
    let s = square(&mut ctx, 0.0, "");
    let stored = ctx.groups.nb_stored();
    let next_group = ctx.groups.next_id();

    let add = CommandAddRemoveGroupName::new(&ctx, vec![s], Dim::Surface, "Roof", GroupEditKind::Add)
        .unwrap();
    manager.run(Box::new(add), &mut ctx).unwrap();
    assert_eq!(group_names(&mut ctx, s), vec!["Roof"]);
    assert!(manager.undo(&mut ctx).unwrap());
    assert_eq!(group_names(&mut ctx, s), vec!["Hors Groupe 2D"]);

    // 新命令丢弃重做栈中的分组命令
    let vertex = CommandNewVertex::new(&ctx, Point3::new(5.0, 0.0, 0.0), "").unwrap();
    manager.run(Box::new(vertex), &mut ctx).unwrap();
    assert!(ctx.groups.get_group(Dim::Surface, "Roof", false).unwrap().is_none());
    assert_eq!(ctx.groups.nb_stored(), stored);
    assert_eq!(ctx.groups.next_id(), next_group);
    assert_eq!(group_names(&mut ctx, s), vec!["Hors Groupe 2D"]);
}

#[test]
fn test_preview_leaves_groups_untouched() {
    let mut ctx = Context::new();
    let s = square(&mut ctx, 0.0, "Floor");
    let stored = ctx.groups.nb_stored();
    let next_group = ctx.groups.next_id();

    let mut prism = CommandNewPrism::new(&ctx, vec![s], Vector3::z(), "Solids").unwrap();
    prism.preview_new_objects(&mut ctx).unwrap();
    assert_eq!(ctx.groups.nb_stored(), stored);
    assert_eq!(ctx.groups.next_id(), next_group);
    assert!(ctx.groups.get_group(Dim::Volume, "Solids", false).unwrap().is_none());

    prism.execute(&mut ctx).unwrap();
    let solids = ctx.groups.get_group(Dim::Volume, "Solids", true).unwrap().unwrap();
    assert!(solids >= next_group);
}

#[test]
fn test_modelling_session() {
    let mut ctx = Context::new();
    let mut manager = CommandManager::from_context(&ctx);

    let s = square(&mut ctx, 0.0, "Floor");
    let prism = CommandNewPrism::new(&ctx, vec![s], Vector3::new(0.0, 0.0, 2.0), "Solids").unwrap();
    manager.run(Box::new(prism), &mut ctx).unwrap();
    let vol = ctx.geom.volumes()[0];

    let plane = Plane::new(Point3::new(0.0, 0.0, 1.0), Vector3::z()).unwrap();
    let section = CommandSectionByPlane::new(&ctx, vec![vol], plane, "Cut").unwrap();
    manager.run(Box::new(section), &mut ctx).unwrap();
    assert_eq!(ctx.geom.nb(Dim::Volume), 2);
    for half in ctx.geom.volumes() {
        assert_eq!(group_names(&mut ctx, half), vec!["Floor", "Solids"]);
    }

    assert!(manager.undo(&mut ctx).unwrap());
    assert_eq!(ctx.geom.volumes(), vec![vol]);
    assert!(manager.redo(&mut ctx).unwrap());
    assert_eq!(ctx.geom.nb(Dim::Volume), 2);
    assert_eq!(manager.history().len(), 2);
}
