// SPDX-License-Identifier: GPL-3.0-only

//! Render engine lifecycle against a recording GL

mod common;

use common::{
    Bindings, COMPILE_ERROR_MARKER, EventLog, FakeContextFactory, LINK_ERROR_MARKER, eventually,
    solid_frame,
};
use live_preview::config::RenderSettings;
use live_preview::errors::ErrorCode;
use live_preview::gpu::{TargetSurface, TextureId, TransformMatrix};
use live_preview::render::{RenderCommand, RenderCore, RenderEngine};
use live_preview::shaders::{
    BuiltinFilter, FilterSource, PASSTHROUGH_FRAGMENT_SHADER, PASSTHROUGH_VERTEX_SHADER,
};
use live_preview::status::{Source, StatusEvent};
use live_preview::worker::WorkerAction;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const TARGET: TargetSurface = TargetSurface::Offscreen {
    width: 640,
    height: 480,
};

fn engine(factory: &Arc<FakeContextFactory>, log: &Arc<EventLog>) -> RenderEngine {
    engine_with(factory, log, RenderSettings::default())
}

fn engine_with(
    factory: &Arc<FakeContextFactory>,
    log: &Arc<EventLog>,
    settings: RenderSettings,
) -> RenderEngine {
    RenderEngine::new(factory.clone(), log.clone(), settings).unwrap()
}

fn custom(name: &str, fragment: String) -> FilterSource {
    FilterSource::Custom {
        name: name.to_string(),
        vertex: PASSTHROUGH_VERTEX_SHADER.to_string(),
        fragment,
    }
}

fn initialized(factory: &FakeContextFactory) -> bool {
    let gl = factory.gl.lock().unwrap();
    gl.viewport.is_some() && !gl.programs.is_empty()
}

#[test]
fn test_init_builds_texture_and_chain() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let engine = engine(&factory, &log);

    engine.init(TARGET);
    assert!(eventually(|| initialized(&factory)));

    let gl = factory.gl.lock().unwrap();
    assert_eq!(gl.viewport, Some((640, 480)));
    assert_eq!(gl.programs.len(), 1);
    assert_eq!(gl.textures.len(), 1);
    // Shader objects are deleted once linked
    assert!(gl.shaders.is_empty());
    assert!(log.events().is_empty());
}

#[test]
fn test_published_frame_is_drawn_and_presented() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let engine = engine(&factory, &log);
    engine.init(TARGET);

    let mut frame = solid_frame(8, 4, 200);
    frame.transform = TransformMatrix::vertical_flip();
    assert!(engine.camera_surface().publish(frame));

    assert!(eventually(|| engine.stats().frames_presented == 1));
    let stats = engine.stats();
    assert_eq!(stats.frames_rendered, 1);
    assert_eq!(stats.present_failures, 0);

    let gl = factory.gl.lock().unwrap();
    assert_eq!(gl.uploads, vec![(8, 4)]);
    assert_eq!(gl.draws, 1);
    assert_eq!(gl.clears, 1);
    assert_eq!(gl.last_transform, Some(TransformMatrix::vertical_flip()));
    // Nothing stays bound after the chain draws
    assert_eq!(gl.bindings, Bindings::default());
}

#[test]
fn test_signals_before_drain_render_once() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let engine = engine(&factory, &log);

    // Keep the worker busy in init while frames arrive
    factory.gate.close();
    engine.init(TARGET);
    assert!(eventually(|| factory.gate.waiting() == 1));

    let surface = engine.camera_surface();
    assert!(surface.publish(solid_frame(2, 2, 1)));
    assert!(surface.publish(solid_frame(2, 2, 2)));
    factory.gate.open();

    assert!(eventually(|| engine.stats().frames_rendered == 1));
    std::thread::sleep(Duration::from_millis(50));
    let stats = engine.stats();
    assert_eq!(stats.frames_rendered, 1);
    assert_eq!(stats.signals_coalesced, 1);
    assert_eq!(factory.gl.lock().unwrap().uploads.len(), 1);
}

#[test]
fn test_render_without_frame_draws_nothing() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let engine = engine(&factory, &log);
    engine.init(TARGET);
    assert!(eventually(|| initialized(&factory)));

    assert!(engine.request_render());
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.camera_surface().signal().posted(), 1);
    assert_eq!(engine.stats().frames_rendered, 0);
    assert_eq!(factory.draws(), 0);
    assert_eq!(factory.contexts.swaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_second_stage_samples_first_stage_output() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let settings = RenderSettings {
        filters: vec![
            FilterSource::builtin(BuiltinFilter::Grayscale),
            FilterSource::builtin(BuiltinFilter::Passthrough),
        ],
        ..Default::default()
    };
    let mut engine = engine_with(&factory, &log, settings);
    engine.init(TARGET);
    assert!(eventually(|| initialized(&factory)));
    let camera = {
        let gl = factory.gl.lock().unwrap();
        let ids: Vec<u32> = gl.textures.iter().copied().collect();
        assert_eq!(ids.len(), 1);
        TextureId(ids[0])
    };

    engine.camera_surface().publish(solid_frame(4, 4, 7));
    assert!(eventually(|| engine.stats().frames_presented == 1));

    {
        let gl = factory.gl.lock().unwrap();
        assert_eq!(gl.draw_log.len(), 2);
        let (first, second) = (&gl.draw_log[0], &gl.draw_log[1]);
        let framebuffer = first.framebuffer.expect("first stage draws offscreen");
        let intermediate = gl.render_targets[&framebuffer.0];

        assert_eq!(first.texture, Some(camera));
        assert_eq!(second.texture, Some(TextureId(intermediate)));
        assert_ne!(second.texture, Some(camera));
        assert_eq!(second.framebuffer, None);
        assert_ne!(first.program, second.program);
        assert_eq!(gl.bindings, Bindings::default());
    }

    engine.release_and_wait();
    let gl = factory.gl.lock().unwrap();
    assert!(gl.render_targets.is_empty());
    assert!(gl.textures.is_empty());
    assert!(log.events().is_empty());
}

#[test]
fn test_chain_failure_is_counted_not_reported() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let settings = RenderSettings {
        filters: vec![
            FilterSource::builtin(BuiltinFilter::Grayscale),
            FilterSource::builtin(BuiltinFilter::Passthrough),
        ],
        ..Default::default()
    };
    let engine = engine_with(&factory, &log, settings);
    engine.init(TARGET);
    assert!(eventually(|| initialized(&factory)));
    factory.gl.lock().unwrap().fail_render_target = true;

    engine.camera_surface().publish(solid_frame(4, 4, 7));
    assert!(eventually(|| engine.stats().frames_rendered == 1));
    assert_eq!(engine.stats().draw_failures, 1);
    assert_eq!(factory.draws(), 0);
    assert_eq!(factory.bindings(), Bindings::default());
    assert!(log.events().is_empty());
}

#[test]
fn test_context_failure_is_reported() {
    let factory = FakeContextFactory::new();
    factory.contexts.create_fails.store(true, Ordering::SeqCst);
    let log = EventLog::new();
    let engine = engine(&factory, &log);

    engine.init(TARGET);
    assert!(log.wait_for_error(ErrorCode::ContextCreationFailed));
    match &log.events()[0] {
        StatusEvent::Error { source, .. } => assert_eq!(*source, Source::Render),
        other => panic!("unexpected event: {:?}", other),
    }

    // Frames keep arriving but nothing reaches the GPU
    engine.camera_surface().publish(solid_frame(2, 2, 0));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(factory.gl_calls(), 0);
    assert!(engine.is_running());
}

#[test]
fn test_compile_failure_tears_down() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let broken = format!("{}\n{}", COMPILE_ERROR_MARKER, PASSTHROUGH_FRAGMENT_SHADER);
    let settings = RenderSettings {
        filters: vec![FilterSource::default(), custom("broken", broken)],
        ..Default::default()
    };
    let engine = engine_with(&factory, &log, settings);

    engine.init(TARGET);
    assert!(log.wait_for_error(ErrorCode::ShaderCompileFailed));
    assert!(eventually(|| factory.contexts.released.load(Ordering::SeqCst) == 1));

    let gl = factory.gl.lock().unwrap();
    assert!(gl.programs.is_empty(), "built stages are deleted");
    assert!(gl.textures.is_empty());
    assert!(gl.shaders.is_empty());
}

#[test]
fn test_link_failure_is_reported() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let fragment = format!("{}\n{}", PASSTHROUGH_FRAGMENT_SHADER, LINK_ERROR_MARKER);
    let settings = RenderSettings {
        filters: vec![custom("mismatched", fragment)],
        ..Default::default()
    };
    let engine = engine_with(&factory, &log, settings);

    engine.init(TARGET);
    assert!(log.wait_for_error(ErrorCode::ProgramLinkFailed));
}

#[test]
fn test_present_failure_is_counted_not_reported() {
    let factory = FakeContextFactory::new();
    factory.contexts.swap_fails.store(true, Ordering::SeqCst);
    let log = EventLog::new();
    let engine = engine(&factory, &log);
    engine.init(TARGET);

    engine.camera_surface().publish(solid_frame(2, 2, 0));
    assert!(eventually(|| engine.stats().present_failures == 1));
    assert_eq!(engine.stats().frames_presented, 0);
    assert!(log.events().is_empty());
}

#[test]
fn test_release_frees_gpu_and_stops_rendering() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let mut engine = engine(&factory, &log);
    engine.init(TARGET);
    let surface = engine.camera_surface();
    surface.publish(solid_frame(2, 2, 0));
    assert!(eventually(|| engine.stats().frames_presented == 1));

    engine.release_and_wait();
    assert!(!engine.is_running());
    assert_eq!(factory.contexts.released.load(Ordering::SeqCst), 1);
    {
        let gl = factory.gl.lock().unwrap();
        assert!(gl.programs.is_empty());
        assert!(gl.textures.is_empty());
    }

    let calls = factory.gl_calls();
    assert!(!surface.is_valid());
    assert!(!surface.publish(solid_frame(2, 2, 0)));
    assert!(!engine.request_render());
    engine.init(TARGET);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(factory.gl_calls(), calls);
    assert_eq!(factory.contexts.created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_core_ignores_commands_after_release() {
    let factory = FakeContextFactory::new();
    let log = EventLog::new();
    let surface = common::standalone_surface();
    let mut core = RenderCore::new(
        factory.clone(),
        log.clone(),
        &RenderSettings::default(),
        surface.clone(),
    );

    assert_eq!(
        core.handle(RenderCommand::Init(TARGET)),
        WorkerAction::Continue
    );
    assert!(core.is_initialized());

    // A second init keeps the existing context
    core.handle(RenderCommand::Init(TARGET));
    assert_eq!(factory.contexts.created.load(Ordering::SeqCst), 1);

    surface.publish(solid_frame(2, 2, 3));
    core.handle(RenderCommand::Render);
    assert_eq!(core.stats().frames_presented, 1);

    assert_eq!(core.handle(RenderCommand::Release), WorkerAction::Stop);
    assert!(!core.is_initialized());

    let calls = factory.gl_calls();
    core.handle(RenderCommand::Render);
    core.handle(RenderCommand::Init(TARGET));
    assert_eq!(factory.gl_calls(), calls);
    assert_eq!(core.stats().frames_rendered, 1);
}
