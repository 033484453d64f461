//! Headless frame scheduling: queues, frame slots, shadows and the graph

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use glam::Vec3;
use recluse::renderer::{
    Attachment, CmdList, DEFAULT_FENCE_TIMEOUT, FrameScheduler, GraphError, GraphOptions, Handle,
    PassAction, PassId, PrimitiveRange, PrimitiveRenderCmd, RenderError, RenderFlags,
    RenderGraphBuilder, RenderQueues, SimFence, frame_graph,
};

fn cmd(id: u32, flags: RenderFlags, center: Vec3) -> PrimitiveRenderCmd {
    PrimitiveRenderCmd::new(
        Handle::from_raw_parts(id, 0),
        Handle::from_raw_parts(id, 0),
        Handle::from_raw_parts(0, 0),
        PrimitiveRange::new(0, 3),
    )
    .with_flags(flags)
    .with_world_center(center)
}

fn signaled() -> SimFence {
    let fence = SimFence::new();
    fence.signal();
    fence
}

#[test]
fn test_deferred_and_forward_lists_are_disjoint() {
    let extras = [
        RenderFlags::empty(),
        RenderFlags::TRANSPARENT,
        RenderFlags::TRANSLUCENT,
        RenderFlags::FORWARD,
        RenderFlags::DEBUG,
        RenderFlags::SKINNED,
        RenderFlags::MORPH,
    ];
    let mut queues = RenderQueues::new();
    let mut pushed = 0;
    for (i, a) in extras.iter().enumerate() {
        for (j, b) in extras.iter().enumerate() {
            let id = (i * extras.len() + j) as u32;
            let flags = RenderFlags::RENDERABLE | *a | *b;
            let flags = if id % 3 == 0 { flags | RenderFlags::STATIC } else { flags };
            assert!(queues.push_mesh_render(cmd(id, flags, Vec3::ZERO)));
            pushed += 1;
        }
    }

    assert_eq!(queues.deferred().len() + queues.forward().len(), pushed);
    for deferred in queues.deferred() {
        assert!(!deferred.flags.is_forward());
        assert!(queues.forward().iter().all(|f| f.mesh != deferred.mesh));
    }
    for forward in queues.forward() {
        assert!(forward.flags.intersects(RenderFlags::FORWARD_MASK));
    }
}

#[test]
fn test_equal_distances_sort_deterministically() {
    let mut queues = RenderQueues::new();
    // Eight opaque commands on a ring around the eye, plus a near and far one
    for i in 0..8 {
        let angle = i as f32 * std::f32::consts::FRAC_PI_4;
        let center = Vec3::new(angle.cos(), 0.0, angle.sin()) * 5.0;
        queues.push_mesh_render(cmd(i, RenderFlags::RENDERABLE, center));
    }
    queues.push_mesh_render(cmd(100, RenderFlags::RENDERABLE, Vec3::new(0.0, 0.0, 1.0)));
    queues.push_mesh_render(cmd(101, RenderFlags::RENDERABLE, Vec3::new(0.0, 0.0, 20.0)));

    queues.sort(Vec3::ZERO);
    let first: Vec<_> = queues.deferred().iter().map(|c| c.mesh).collect();
    queues.sort(Vec3::ZERO);
    let second: Vec<_> = queues.deferred().iter().map(|c| c.mesh).collect();

    assert_eq!(first, second);
    assert_eq!(first.first(), Some(&Handle::from_raw_parts(100, 0)));
    assert_eq!(first.last(), Some(&Handle::from_raw_parts(101, 0)));
    let distances: Vec<f32> = queues.deferred().iter().map(|c| c.sort_distance).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_slots_are_never_written_while_in_flight() {
    const FRAMES: u64 = 40;
    const SLOTS: usize = 3;

    let busy: Arc<Vec<AtomicBool>> = Arc::new((0..SLOTS).map(|_| AtomicBool::new(false)).collect());
    let (tx, rx) = mpsc::channel::<(usize, SimFence)>();

    let gpu_busy = Arc::clone(&busy);
    let gpu = std::thread::spawn(move || {
        for (slot, fence) in rx {
            std::thread::sleep(Duration::from_micros(300));
            gpu_busy[slot].store(false, Ordering::SeqCst);
            fence.signal();
        }
    });

    let mut scheduler: FrameScheduler<SimFence> = FrameScheduler::new(SLOTS, DEFAULT_FENCE_TIMEOUT);
    for frame in 0..FRAMES {
        let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
        assert_eq!(plan.frame_number(), frame);
        let slot = plan.slot.index;
        assert!(
            !busy[slot].swap(true, Ordering::SeqCst),
            "slot {slot} written while the GPU still reads it"
        );
        assert!(scheduler.sync().in_flight() < SLOTS);

        let fence = SimFence::new();
        tx.send((slot, fence.clone())).unwrap();
        scheduler.submit(&plan, fence);
    }
    drop(tx);
    gpu.join().unwrap();
    scheduler.wait_idle().unwrap();
    assert_eq!(scheduler.sync().in_flight(), 0);
}

#[test]
fn test_hung_gpu_surfaces_as_device_lost() {
    let mut scheduler: FrameScheduler<SimFence> = FrameScheduler::new(2, Duration::from_millis(5));
    for _ in 0..2 {
        let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
        scheduler.submit(&plan, SimFence::new());
    }
    assert!(matches!(
        scheduler.begin_frame(Vec3::ZERO),
        Err(RenderError::DeviceLost { slot: 0, .. })
    ));
}

#[test]
fn test_static_map_update_is_idempotent_until_rendered() {
    let mut scheduler: FrameScheduler<SimFence> = FrameScheduler::new(2, DEFAULT_FENCE_TIMEOUT);

    // The first frame always builds the static map
    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(plan.shadow.render_static);
    scheduler.submit(&plan, signaled());
    assert!(!scheduler.shadows().is_dirty());
    let baseline = scheduler.shadows().static_refreshes();

    scheduler.signal_static_map_update();
    scheduler.signal_static_map_update();
    assert!(scheduler.shadows().is_dirty());

    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(plan.shadow.render_static);
    scheduler.submit(&plan, signaled());
    assert_eq!(scheduler.shadows().static_refreshes(), baseline + 1);
    assert!(!scheduler.shadows().is_dirty());

    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(!plan.shadow.render_static);
    assert!(plan.shadow.render_dynamic);
    scheduler.submit(&plan, signaled());
    assert_eq!(scheduler.shadows().static_refreshes(), baseline + 1);
}

#[test]
fn test_signal_during_refresh_schedules_another() {
    let mut scheduler: FrameScheduler<SimFence> = FrameScheduler::new(2, DEFAULT_FENCE_TIMEOUT);
    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(plan.shadow.render_static);
    scheduler.signal_static_map_update();
    scheduler.submit(&plan, signaled());

    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(plan.shadow.render_static);
    scheduler.submit(&plan, signaled());
    assert_eq!(scheduler.shadows().static_refreshes(), 2);
}

#[test]
fn test_static_set_change_triggers_refresh() {
    let mut scheduler: FrameScheduler<SimFence> = FrameScheduler::new(2, DEFAULT_FENCE_TIMEOUT);
    let floor = cmd(1, RenderFlags::RENDERABLE | RenderFlags::STATIC, Vec3::ZERO);

    scheduler.push_mesh_render(floor);
    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    scheduler.submit(&plan, signaled());

    // Same static set: nothing to redo
    scheduler.push_mesh_render(floor);
    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(!plan.shadow.render_static);
    scheduler.submit(&plan, signaled());

    // A new static object appears
    scheduler.push_mesh_render(floor);
    scheduler.push_mesh_render(cmd(2, RenderFlags::RENDERABLE | RenderFlags::STATIC, Vec3::X));
    let plan = scheduler.begin_frame(Vec3::ZERO).unwrap();
    assert!(plan.shadow.render_static);
    scheduler.submit(&plan, signaled());
}

#[test]
fn test_mixed_commands_partition() {
    let mut queues = RenderQueues::new();
    queues.push_mesh_render(cmd(1, RenderFlags::RENDERABLE | RenderFlags::STATIC, Vec3::ZERO));
    queues.push_mesh_render(cmd(2, RenderFlags::RENDERABLE | RenderFlags::TRANSPARENT, Vec3::ZERO));
    queues.push_mesh_render(cmd(
        3,
        RenderFlags::RENDERABLE | RenderFlags::FORWARD | RenderFlags::DEBUG | RenderFlags::STATIC,
        Vec3::ZERO,
    ));

    assert_eq!(queues.deferred().len(), 1);
    assert_eq!(queues.deferred().get(0).map(|c| c.mesh), Some(Handle::from_raw_parts(1, 0)));
    assert_eq!(queues.forward().len(), 2);
}

#[test]
fn test_cmd_list_grows_without_losing_items() {
    let mut list = CmdList::with_capacity(1);
    for value in 10..15_u32 {
        list.push_back(value);
    }
    assert!(list.capacity() >= 5);
    assert_eq!(list.len(), 5);
    assert_eq!(list.as_slice(), &[10, 11, 12, 13, 14]);
}

#[test]
fn test_frame_graph_orders_dependencies() {
    let graph = frame_graph(GraphOptions::default()).unwrap();
    let at = |id| graph.position(id).unwrap();

    assert!(at(PassId::Shadow) < at(PassId::PbrLighting));
    assert!(at(PassId::GBuffer) < at(PassId::PbrLighting));
    assert!(at(PassId::PbrLighting) < at(PassId::Skybox));
    assert!(at(PassId::Skybox) < at(PassId::Forward));
    assert!(at(PassId::Bloom16x) < at(PassId::Glow));
    assert!(at(PassId::Hdr) < at(PassId::Final));
    assert_eq!(graph.passes().last().map(|p| p.id), Some(PassId::Ui));

    // Every wait points at an earlier pass
    for (index, pass) in graph.passes().iter().enumerate() {
        for wait in &pass.waits {
            assert!(at(*wait) < index, "{:?} waits on later {wait:?}", pass.id);
        }
    }
}

#[test]
fn test_disabled_shadows_become_a_transition() {
    let graph = frame_graph(GraphOptions {
        shadows: false,
        bloom: false,
        antialiasing: true,
    })
    .unwrap();
    assert_eq!(graph.pass(PassId::Shadow).map(|p| p.action), Some(PassAction::TransitionOnly));
    assert!(!graph.contains(PassId::Glow));
    assert!(graph.position(PassId::Fxaa).unwrap() < graph.position(PassId::Hdr).unwrap());
}

#[test]
fn test_builder_rejects_wiring_mistakes() {
    let mut builder = RenderGraphBuilder::new();
    builder.add_pass(PassId::Hdr).read(Attachment::SceneColor);
    assert!(matches!(
        builder.compile(),
        Err(GraphError::ReadBeforeWrite { pass: PassId::Hdr, .. })
    ));

    let mut builder = RenderGraphBuilder::new();
    builder.add_pass(PassId::GBuffer).write(Attachment::GAlbedo);
    builder.add_pass(PassId::GBuffer).write(Attachment::GNormal);
    assert_eq!(builder.compile(), Err(GraphError::DuplicatePass(PassId::GBuffer)));
}
