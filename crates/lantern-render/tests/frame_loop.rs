//! Frame-loop and instanced-renderer behavior over the headless backend.

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use lantern_render::uniforms::{InstanceRecord, Vertex};
use lantern_render::{
    HeadlessBackend, InstancedMeshRenderer, Material, Mesh, MeshKey, Model, RenderBackend,
    RenderContext, RenderSettings, Scene,
};

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

fn settings(frames_in_flight: usize) -> RenderSettings {
    RenderSettings {
        frames_in_flight,
        window_width: EXTENT.width,
        window_height: EXTENT.height,
        ..Default::default()
    }
}

fn camera() -> lantern_render::Camera {
    lantern_render::Camera::look_at(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, 800.0 / 600.0)
}

/// One triangle mesh with a plain material, plus `model_count` models.
fn populate_scene(backend: &mut HeadlessBackend, scene: &mut Scene, model_count: usize) -> MeshKey {
    let vertices = [
        Vertex {
            position: [0.0, 1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.5, 0.0],
        },
        Vertex {
            position: [-1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 1.0],
        },
        Vertex {
            position: [1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [1.0, 1.0],
        },
    ];
    let vertex_buffer = backend
        .create_vertex_buffer(bytemuck::cast_slice(&vertices), "tri-vertices")
        .unwrap();
    let index_buffer = backend
        .create_index_buffer(bytemuck::cast_slice(&[0u32, 1, 2]), "tri-indices")
        .unwrap();

    let mesh = scene.add_mesh(Mesh {
        vertex_buffer,
        index_buffer,
        index_count: 3,
        material: Some(Material {
            ambient: Vec4::splat(0.1),
            diffuse: Vec4::splat(0.8),
            specular: Vec4::splat(0.5),
            shininess: 32.0,
            base_color_map: None,
            normal_map: None,
        }),
    });
    for i in 0..model_count {
        scene.add_model(Model {
            mesh,
            transform: Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
        });
    }
    mesh
}

fn context(frames_in_flight: usize) -> (RenderContext<HeadlessBackend>, Scene) {
    let mut backend = HeadlessBackend::new(frames_in_flight, EXTENT);
    let mut scene = Scene::new();
    populate_scene(&mut backend, &mut scene, 10);

    let settings = settings(frames_in_flight);
    let renderer = InstancedMeshRenderer::new(&mut backend, &settings).unwrap();
    let mut ctx = RenderContext::new(backend, settings);
    ctx.add_renderer(Box::new(renderer));
    (ctx, scene)
}

#[test]
fn five_frames_yield_five_draws_with_full_instance_count() {
    let (mut ctx, scene) = context(2);
    let camera = camera();

    for _ in 0..5 {
        assert!(ctx.render(&scene, &camera).unwrap());
    }

    let draws = ctx.backend().draws();
    assert_eq!(draws.len(), 5);
    for draw in draws {
        assert_eq!(draw.instance_count, 10);
        assert_eq!(draw.index_count, 3);
    }
}

#[test]
fn slots_alternate_and_use_their_own_instance_buffers() {
    let (mut ctx, scene) = context(2);
    let camera = camera();

    for _ in 0..4 {
        ctx.render(&scene, &camera).unwrap();
    }

    let draws = ctx.backend().draws();
    let slots: Vec<usize> = draws.iter().map(|d| d.slot.index()).collect();
    assert_eq!(slots, vec![0, 1, 0, 1]);

    // consecutive frames write disjoint buffers, alternating with the slot
    assert_ne!(draws[0].instance_buffer, draws[1].instance_buffer);
    assert_eq!(draws[0].instance_buffer, draws[2].instance_buffer);
    assert_eq!(draws[1].instance_buffer, draws[3].instance_buffer);
}

#[test]
fn stale_acquire_skips_the_frame_and_rebuilds_without_advancing() {
    let (mut ctx, scene) = context(2);
    let camera = camera();

    ctx.backend_mut().inject_stale_acquires(1);
    assert!(!ctx.render(&scene, &camera).unwrap());
    assert_eq!(ctx.backend().recreate_count(), 1);
    assert!(ctx.backend().draws().is_empty());

    // the retried frame reuses slot 0
    assert!(ctx.render(&scene, &camera).unwrap());
    assert_eq!(ctx.backend().draws()[0].slot.index(), 0);
}

#[test]
fn stale_present_rebuilds_and_holds_the_slot() {
    let (mut ctx, scene) = context(2);
    let camera = camera();

    ctx.backend_mut().inject_stale_presents(1);
    assert!(ctx.render(&scene, &camera).unwrap());
    assert_eq!(ctx.backend().recreate_count(), 1);

    ctx.render(&scene, &camera).unwrap();
    let slots: Vec<usize> = ctx.backend().draws().iter().map(|d| d.slot.index()).collect();
    // the frame after the stale present stays on slot 0
    assert_eq!(slots, vec![0, 0]);
}

#[test]
fn recreation_waits_out_a_zero_drawable_extent() {
    let (mut ctx, scene) = context(2);
    let camera = camera();

    let zero = vk::Extent2D { width: 0, height: 0 };
    ctx.backend_mut().set_drawable_extent(zero);
    ctx.backend_mut()
        .script_drawable_extents([zero, zero, vk::Extent2D { width: 1024, height: 768 }]);
    ctx.backend_mut().inject_stale_acquires(1);

    assert!(!ctx.render(&scene, &camera).unwrap());
    assert_eq!(ctx.backend().pump_count(), 3);
    assert_eq!(ctx.backend().recreate_count(), 1);
    assert_eq!(ctx.swapchain_extent(), vk::Extent2D { width: 1024, height: 768 });
}

#[test]
fn back_to_back_recreation_is_safe() {
    let (mut ctx, scene) = context(2);
    let camera = camera();
    ctx.render(&scene, &camera).unwrap();
    let draw = ctx.backend().draws()[0].clone();

    ctx.recreate_swapchain().unwrap();
    ctx.recreate_swapchain().unwrap();
    assert_eq!(ctx.backend().recreate_count(), 2);

    // renderer-owned objects survive; only swapchain-dependent state cycled
    assert!(ctx.backend().is_valid_object(draw.instance_buffer));
    assert!(ctx.render(&scene, &camera).unwrap());
}

#[test]
fn instance_buffers_track_model_count_across_rebuilds() {
    let (mut ctx, mut scene) = context(2);
    let camera = camera();

    ctx.render(&scene, &camera).unwrap();
    let first = ctx.backend().draws().last().unwrap().clone();
    assert_eq!(
        ctx.backend().buffer_bytes(first.instance_buffer).len(),
        10 * std::mem::size_of::<InstanceRecord>()
    );

    // membership change forces a rebuild with exactly-sized buffers
    let mesh = scene.models()[0].mesh;
    scene.add_model(Model {
        mesh,
        transform: Mat4::IDENTITY,
    });
    ctx.render(&scene, &camera).unwrap();

    let second = ctx.backend().draws().last().unwrap().clone();
    assert_eq!(second.instance_count, 11);
    assert_eq!(
        ctx.backend().buffer_bytes(second.instance_buffer).len(),
        11 * std::mem::size_of::<InstanceRecord>()
    );
    // the old group's buffers were destroyed through the arena
    assert!(!ctx.backend().is_valid_object(first.instance_buffer));
}

#[test]
fn writing_one_slot_leaves_the_other_slots_bytes_alone() {
    let (mut ctx, mut scene) = context(2);
    let camera = camera();

    ctx.render(&scene, &camera).unwrap();
    let slot0_draw = ctx.backend().draws().last().unwrap().clone();
    let slot0_bytes = ctx.backend().buffer_bytes(slot0_draw.instance_buffer);

    // move every model, then render the next slot
    for i in 0..scene.models().len() {
        scene.set_model_transform(i, Mat4::from_translation(Vec3::new(0.0, 42.0, 0.0)));
    }
    ctx.render(&scene, &camera).unwrap();
    let slot1_draw = ctx.backend().draws().last().unwrap().clone();

    assert_ne!(slot0_draw.instance_buffer, slot1_draw.instance_buffer);
    // slot 0's records are untouched by slot 1's update
    assert_eq!(ctx.backend().buffer_bytes(slot0_draw.instance_buffer), slot0_bytes);
    assert_ne!(ctx.backend().buffer_bytes(slot1_draw.instance_buffer), slot0_bytes);
}

#[test]
fn instance_records_follow_the_camera_view() {
    let (mut ctx, scene) = context(1);
    let camera = camera();

    ctx.render(&scene, &camera).unwrap();
    let draw = ctx.backend().draws()[0].clone();
    let bytes = ctx.backend().buffer_bytes(draw.instance_buffer);
    let records: &[InstanceRecord] = bytemuck::cast_slice(&bytes);

    assert_eq!(records.len(), 10);
    for (i, record) in records.iter().enumerate() {
        let expected =
            InstanceRecord::compute(Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)), camera.view);
        assert_eq!(*record, expected);
    }
}

#[test]
fn groups_without_a_material_are_registered_but_not_drawn() {
    let mut backend = HeadlessBackend::new(2, EXTENT);
    let mut scene = Scene::new();
    let vertex_buffer = backend.create_vertex_buffer(&[0; 32], "bare-vertices").unwrap();
    let index_buffer = backend
        .create_index_buffer(bytemuck::cast_slice(&[0u32, 1, 2]), "bare-indices")
        .unwrap();
    let mesh = scene.add_mesh(Mesh {
        vertex_buffer,
        index_buffer,
        index_count: 3,
        material: None,
    });
    scene.add_model(Model {
        mesh,
        transform: Mat4::IDENTITY,
    });

    let settings = settings(2);
    let renderer = InstancedMeshRenderer::new(&mut backend, &settings).unwrap();
    let mut ctx = RenderContext::new(backend, settings);
    ctx.add_renderer(Box::new(renderer));

    assert!(ctx.render(&scene, &camera()).unwrap());
    assert!(ctx.backend().draws().is_empty());
}

#[test]
fn shutdown_releases_every_renderer_owned_object() {
    let (mut ctx, scene) = context(2);
    let camera = camera();
    ctx.render(&scene, &camera).unwrap();

    let draw = ctx.backend().draws()[0].clone();
    assert!(ctx.backend().is_valid_object(draw.instance_buffer));

    ctx.shutdown();
    assert!(!ctx.backend().is_valid_object(draw.instance_buffer));
    // mesh geometry belongs to the scene's creator, not the renderer
    assert!(ctx.backend().is_valid_object(draw.vertex_buffer));
}
