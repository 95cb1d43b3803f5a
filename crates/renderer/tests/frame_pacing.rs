//! Integration tests for frame pacing on the simulated GPU.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use fivemapper_renderer::{FramePhase, FrameSyncConfig, Renderer};
use fivemapper_rhi::backend::{Fence, Swapchain};
use fivemapper_rhi::sim::{
    GpuPacing, HeadlessWindow, SimAdapterDesc, SimDevice, SimEvent, SimGpu, SimInstance,
};
use fivemapper_rhi::{ErrorCategory, FeatureLevel, ResourceState, RhiError};

const CLEAR: [f32; 4] = [0.2, 0.3, 0.4, 1.0];

fn window() -> HeadlessWindow {
    HeadlessWindow::new(1280, 720)
}

/// Routes frame logs to the test harness; `RUST_LOG=debug` shows them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn renderer_with(gpu: &SimGpu, config: FrameSyncConfig) -> Renderer<SimDevice> {
    init_logging();
    Renderer::new(&SimInstance::single(gpu.clone()), &window(), config)
        .expect("Failed to create renderer")
}

fn renderer(gpu: &SimGpu) -> Renderer<SimDevice> {
    renderer_with(gpu, FrameSyncConfig::default())
}

/// Renders `frames` frames and returns, per frame, whether `begin_frame`
/// blocked on the fence.
fn blocking_pattern(renderer: &mut Renderer<SimDevice>, frames: usize) -> Vec<bool> {
    (0..frames)
        .map(|_| {
            let before = renderer.stats().cpu_blocks;
            renderer
                .render_frame(|target| target.clear(CLEAR))
                .expect("frame failed");
            renderer.stats().cpu_blocks > before
        })
        .collect()
}

#[test]
fn test_pool_matches_frame_count() {
    let gpu = SimGpu::new();
    let mut renderer = renderer(&gpu);

    assert_eq!(renderer.resources().frame_count(), 3);
    assert_eq!(renderer.resources().swapchain().buffer_count(), 3);
    assert_eq!(renderer.synchronizer().slots().len(), 3);

    for _ in 0..7 {
        let end = renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
        assert!(end.slot < 3);
    }
}

#[test]
fn test_fence_values_strictly_increase_per_slot() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(2));
    let mut renderer = renderer(&gpu);

    let mut per_slot: HashMap<usize, Vec<u64>> = HashMap::new();
    for _ in 0..12 {
        let end = renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
        per_slot.entry(end.slot).or_default().push(end.fence_value);
    }

    assert_eq!(per_slot.len(), 3);
    for (slot, values) in &per_slot {
        assert!(
            values.windows(2).all(|pair| pair[0] < pair[1]),
            "slot {} values not strictly increasing: {:?}",
            slot,
            values
        );
    }
}

#[test]
fn test_slot_is_complete_once_begin_frame_returns() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(4));
    let mut renderer = renderer(&gpu);

    for _ in 0..10 {
        let slot = renderer.begin_frame().unwrap().slot();
        let pending = renderer.synchronizer().slots().pending(slot).unwrap();
        let completed = renderer.resources().fence().completed_value().unwrap();
        assert!(completed >= pending, "slot {slot}: {completed} < {pending}");
        renderer.end_frame().unwrap();
    }
}

#[test]
fn test_cpu_blocks_only_past_in_flight_window() {
    // GPU finishes each frame four presents later: one frame past what
    // three buffers can hide
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(4));
    let mut renderer = renderer(&gpu);

    let blocked = blocking_pattern(&mut renderer, 10);
    let expected: Vec<bool> = (1..=10).map(|frame| frame >= 4).collect();
    assert_eq!(blocked, expected);
    assert_eq!(renderer.stats().cpu_blocks, 7);
    assert_eq!(renderer.stats().frames_completed, 10);
}

#[test]
fn test_cpu_never_blocks_within_in_flight_window() {
    for lag in [2, 3] {
        let gpu = SimGpu::with_pacing(GpuPacing::Lagged(lag));
        let mut renderer = renderer(&gpu);

        let blocked = blocking_pattern(&mut renderer, 10);
        assert!(blocked.iter().all(|b| !b), "lag {lag} blocked: {blocked:?}");
        assert_eq!(gpu.stats().blocking_waits, 0);
    }
}

#[test]
fn test_completed_waits_skip_blocking_primitive() {
    let gpu = SimGpu::new();
    let mut renderer = renderer(&gpu);

    blocking_pattern(&mut renderer, 10);
    assert_eq!(gpu.stats().blocking_waits, 0);
    assert_eq!(renderer.stats().cpu_blocks, 0);
}

#[test]
fn test_each_present_follows_one_renderable_period() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(3));
    let mut renderer = renderer(&gpu);
    gpu.clear_events();

    blocking_pattern(&mut renderer, 9);

    let mut renderable_periods: HashMap<usize, u32> = HashMap::new();
    let mut state: HashMap<usize, ResourceState> = HashMap::new();
    let mut presents = 0;

    for event in gpu.events() {
        match event {
            SimEvent::Barrier {
                slot,
                before: ResourceState::Presentable,
                after: ResourceState::Renderable,
            } => {
                assert_ne!(state.get(&slot), Some(&ResourceState::Renderable));
                state.insert(slot, ResourceState::Renderable);
                *renderable_periods.entry(slot).or_default() += 1;
            }
            SimEvent::Barrier {
                slot,
                before: ResourceState::Renderable,
                after: ResourceState::Presentable,
            } => {
                assert_eq!(state.get(&slot), Some(&ResourceState::Renderable));
                state.insert(slot, ResourceState::Presentable);
            }
            SimEvent::Clear { slot, .. } => {
                assert_eq!(state.get(&slot), Some(&ResourceState::Renderable));
            }
            SimEvent::Present { slot } => {
                assert_eq!(state.get(&slot), Some(&ResourceState::Presentable));
                assert_eq!(renderable_periods.insert(slot, 0), Some(1));
                presents += 1;
            }
            _ => {}
        }
    }

    assert_eq!(presents, 9);
    assert!(gpu.stats().violations.is_empty(), "{:?}", gpu.stats().violations);
}

#[test]
fn test_software_adapter_never_tried() {
    let gpu = SimGpu::new();
    let instance = SimInstance::new(
        gpu.clone(),
        vec![
            SimAdapterDesc::software("Software Rasterizer"),
            SimAdapterDesc::hardware("Discrete GPU", FeatureLevel::V1_3),
        ],
    );

    let renderer = Renderer::new(&instance, &window(), FrameSyncConfig::default()).unwrap();
    assert_eq!(renderer.adapter_info().name, "Discrete GPU");
    assert!(!renderer.adapter_info().is_software);
    assert_eq!(gpu.stats().device_creation_attempts, vec!["Discrete GPU".to_string()]);
}

#[test]
fn test_insufficient_feature_level_rejected() {
    let gpu = SimGpu::new();
    let instance = SimInstance::new(
        gpu.clone(),
        vec![
            SimAdapterDesc::hardware("Old GPU", FeatureLevel::V1_2),
            SimAdapterDesc::hardware("New GPU", FeatureLevel::V1_3),
        ],
    );

    let renderer = Renderer::new(&instance, &window(), FrameSyncConfig::default()).unwrap();
    assert_eq!(renderer.adapter_info().name, "New GPU");
    assert_eq!(gpu.stats().device_creation_attempts.len(), 2);
}

#[test]
fn test_scripted_presentation_order_is_honored() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(2));
    let mut renderer = renderer(&gpu);
    gpu.script_present_order([2, 0, 0, 1, 2]);

    let slots: Vec<usize> = (0..5)
        .map(|_| renderer.render_frame(|target| target.clear(CLEAR)).unwrap().slot)
        .collect();
    assert_eq!(slots, vec![2, 0, 0, 1, 2]);
    assert!(gpu.stats().violations.is_empty());
}

#[test]
fn test_wait_timeout_reported() {
    let gpu = SimGpu::with_pacing(GpuPacing::Manual);
    let config = FrameSyncConfig::default().with_wait_timeout(Some(Duration::from_millis(20)));
    let mut renderer = renderer_with(&gpu, config);

    blocking_pattern(&mut renderer, 3);

    let err = renderer.begin_frame().err().expect("fourth frame must time out");
    assert!(matches!(
        err,
        RhiError::SynchronizationTimeout {
            slot: Some(0),
            value: 1,
            ..
        }
    ));
    assert_eq!(err.category(), ErrorCategory::SynchronizationTimeout);
    assert_eq!(renderer.phase(), FramePhase::Faulted);

    gpu.complete_all();
    gpu.set_pacing(GpuPacing::Immediate);
    assert!(renderer.reset(&window()).unwrap());
    renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
}

#[test]
fn test_blocked_wait_released_by_gpu_progress() {
    let gpu = SimGpu::with_pacing(GpuPacing::Manual);
    let mut renderer = renderer(&gpu);

    blocking_pattern(&mut renderer, 3);

    let remote = gpu.clone();
    let completer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.complete_through(1);
    });

    let slot = renderer.begin_frame().unwrap().slot();
    assert_eq!(slot, 0);
    renderer.end_frame().unwrap();
    completer.join().unwrap();

    let stats = renderer.stats();
    assert_eq!(stats.cpu_blocks, 1);
    assert!(stats.blocked_time >= Duration::from_millis(20));
    assert_eq!(gpu.stats().blocking_waits, 1);

    gpu.complete_all();
    gpu.set_pacing(GpuPacing::Immediate);
}

#[test]
fn test_present_failure_faults_until_reset() {
    let gpu = SimGpu::new();
    let mut renderer = renderer(&gpu);

    renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
    gpu.fail_next_present();

    let err = renderer.render_frame(|target| target.clear(CLEAR)).unwrap_err();
    assert!(matches!(err, RhiError::PresentFailed(_)));
    assert_eq!(err.category(), ErrorCategory::PerFrame);
    assert_eq!(renderer.phase(), FramePhase::Faulted);
    assert!(matches!(
        renderer.begin_frame(),
        Err(RhiError::InvalidFramePhase { phase: "faulted", .. })
    ));

    assert!(renderer.reset(&window()).unwrap());
    assert_eq!(renderer.phase(), FramePhase::Idle);
    for _ in 0..4 {
        renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
    }
    assert!(gpu.stats().violations.is_empty(), "{:?}", gpu.stats().violations);
}

#[test]
fn test_reset_abandons_open_frame() {
    let gpu = SimGpu::new();
    let mut renderer = renderer(&gpu);

    renderer.begin_frame().unwrap();
    assert_eq!(renderer.phase(), FramePhase::Recording);

    assert!(renderer.reset(&window()).unwrap());
    renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
    assert!(gpu.stats().violations.is_empty(), "{:?}", gpu.stats().violations);
}

#[test]
fn test_device_loss_is_fatal() {
    let gpu = SimGpu::new();
    let mut renderer = renderer(&gpu);

    renderer.render_frame(|target| target.clear(CLEAR)).unwrap();
    gpu.lose_device();

    let err = renderer.begin_frame().err().expect("device is lost");
    assert!(matches!(err, RhiError::DeviceLost));
    assert!(err.is_fatal());
    assert!(renderer.shutdown().is_err());
    assert!(renderer.shutdown().is_ok());
}

#[test]
fn test_resize_leaves_no_stale_views() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(3));
    let mut renderer = renderer(&gpu);

    blocking_pattern(&mut renderer, 5);

    assert!(!renderer.resize(&HeadlessWindow::new(0, 0)).unwrap());
    assert!(matches!(renderer.begin_frame(), Err(RhiError::ResizeInProgress)));
    assert_eq!(gpu.stats().live_views, 0);
    assert_eq!(gpu.pending_signals(), 0);

    assert!(renderer.resize(&HeadlessWindow::new(1920, 1080)).unwrap());
    assert_eq!(renderer.resources().viewport().width, 1920.0);
    assert_eq!(renderer.resources().scissor().right, 1920);
    assert_eq!(gpu.stats().live_views, 3);

    blocking_pattern(&mut renderer, 5);
    assert!(gpu.stats().violations.is_empty(), "{:?}", gpu.stats().violations);
    assert_eq!(gpu.stats().swapchain_recreations, 1);
}

#[test]
fn test_shutdown_twice() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(4));
    let mut renderer = renderer(&gpu);

    blocking_pattern(&mut renderer, 6);
    renderer.shutdown().unwrap();
    let after_first = gpu.stats();
    assert_eq!(after_first.live_views, 0);
    assert_eq!(gpu.pending_signals(), 0);

    renderer.shutdown().unwrap();
    assert_eq!(gpu.stats().signals, after_first.signals);
    assert_eq!(renderer.phase(), FramePhase::ShutDown);
}

#[test]
fn test_fence_reflects_last_signal_after_drain() {
    let gpu = SimGpu::with_pacing(GpuPacing::Lagged(3));
    let mut renderer = renderer(&gpu);

    blocking_pattern(&mut renderer, 4);
    renderer.shutdown().unwrap();

    let fence = renderer.resources().fence();
    assert_eq!(fence.inner().completed_value().unwrap(), fence.last_issued());
    // Four frames plus one drain signal per queue
    assert_eq!(fence.last_issued(), 7);
}
