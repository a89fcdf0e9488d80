use vibra_backend::audio_device::{
    ControlOp, DeviceLifecycleController, HostCall, HostError, HostOp, LifecycleError,
    LifecycleState, LoopbackHost,
};
use vibra_backend::rt_processing::WaveformGenerator;
use vibra_core::{HarnessConfig, ReinitPolicy, StereoFrame};

type Controller = DeviceLifecycleController<LoopbackHost, WaveformGenerator>;

fn started(policy: ReinitPolicy) -> (LoopbackHost, Controller) {
    let host = LoopbackHost::new();
    let mut config = HarnessConfig::default();
    config.lifecycle.reinit_policy = policy;
    let mut controller = DeviceLifecycleController::from_config(host.clone(), &config);
    controller.start().expect("start");
    (host, controller)
}

fn generated_frames(count: usize) -> Vec<StereoFrame> {
    WaveformGenerator::default().take(count).collect()
}

#[test]
fn start_leaves_one_running_stream() {
    let (host, controller) = started(ReinitPolicy::Discard);
    let stream = controller.current_stream().expect("stream");

    assert_eq!(controller.state(), LifecycleState::OpenRunning);
    assert_eq!(
        host.calls(),
        vec![HostCall::InitSubsystem, HostCall::Open(stream), HostCall::Resume(stream)]
    );
    assert_eq!(host.stream_format(stream), Some(controller.format().clone()));
}

#[test]
fn device_reads_decode_to_the_generated_tone() {
    let (host, controller) = started(ReinitPolicy::Discard);
    let stream = controller.current_stream().expect("stream");

    let bytes = host.pump_bytes(stream, 4_000).expect("running stream");
    assert_eq!(StereoFrame::decode_all(&bytes), generated_frames(1_000));

    let mut samples = [0i16; 8];
    assert!(host.pump_samples(stream, &mut samples));
    let expected = generated_frames(1_004);
    let tail: Vec<i16> = expected[1_000..].iter().flat_map(|f| [f.left, f.right]).collect();
    assert_eq!(samples.to_vec(), tail);

    assert_eq!(controller.slot().frames_served(), 1_004);
}

#[test]
fn pause_and_resume_are_idempotent() {
    let (host, mut controller) = started(ReinitPolicy::Discard);
    let stream = controller.current_stream().expect("stream");

    controller.resume().expect("resume while running");
    assert_eq!(controller.state(), LifecycleState::OpenRunning);

    controller.pause().expect("pause");
    host.clear_calls();
    controller.pause().expect("pause while paused");
    assert_eq!(controller.state(), LifecycleState::OpenPaused);
    assert!(host.calls().is_empty());
    assert_eq!(host.is_running(stream), Some(false));

    controller.resume().expect("resume");
    assert_eq!(host.is_running(stream), Some(true));
}

#[test]
fn reinitialize_with_discard_leaves_old_stream_to_the_host() {
    let (host, mut controller) = started(ReinitPolicy::Discard);
    let old = controller.current_stream().expect("stream");
    host.clear_calls();

    let new = controller.reinitialize().expect("reinit");

    assert_ne!(old, new);
    assert_eq!(controller.state(), LifecycleState::OpenRunning);
    assert_eq!(
        host.calls(),
        vec![HostCall::Pause(old), HostCall::Open(new), HostCall::Resume(new)]
    );
    assert_eq!(host.live_streams(), vec![old, new]);
    assert_eq!(host.is_running(old), Some(false));
    assert_eq!(controller.discarded_streams(), &[old]);
}

#[test]
fn reinitialize_with_close_releases_old_stream() {
    let (host, mut controller) = started(ReinitPolicy::Close);
    let old = controller.current_stream().expect("stream");
    host.clear_calls();

    let new = controller.reinitialize().expect("reinit");

    assert_eq!(
        host.calls(),
        vec![
            HostCall::Pause(old),
            HostCall::Close(old),
            HostCall::Open(new),
            HostCall::Resume(new),
        ]
    );
    assert_eq!(host.live_streams(), vec![new]);
    assert!(controller.discarded_streams().is_empty());
}

#[test]
fn reinitialize_from_paused_still_pauses_first() {
    let (host, mut controller) = started(ReinitPolicy::Close);
    let old = controller.current_stream().expect("stream");
    controller.pause().expect("pause");
    host.clear_calls();

    let new = controller.reinitialize().expect("reinit");
    assert_eq!(host.calls()[..2], [HostCall::Pause(old), HostCall::Close(old)]);
    assert_eq!(host.is_running(new), Some(true));
}

#[test]
fn tone_continues_across_reopen() {
    let (host, mut controller) = started(ReinitPolicy::Discard);
    let old = controller.current_stream().expect("stream");
    let first = host.pump_bytes(old, 400).expect("running");

    let new = controller.reinitialize().expect("reinit");
    assert_eq!(host.pump_bytes(old, 4), None, "discarded stream is paused");
    let second = host.pump_bytes(new, 400).expect("running");

    let expected = generated_frames(200);
    assert_eq!(StereoFrame::decode_all(&first), expected[..100]);
    assert_eq!(StereoFrame::decode_all(&second), expected[100..]);
}

#[test]
fn full_restart_tears_everything_down() {
    let (host, mut controller) = started(ReinitPolicy::Discard);
    let first = controller.current_stream().expect("stream");
    let second = controller.reinitialize().expect("reinit");
    host.clear_calls();

    let third = controller.full_restart().expect("full restart");

    assert_eq!(
        host.calls(),
        vec![
            HostCall::Pause(second),
            HostCall::Close(second),
            HostCall::ShutdownSubsystem,
            HostCall::InitSubsystem,
            HostCall::Open(third),
            HostCall::Resume(third),
        ]
    );
    assert_eq!(host.live_streams(), vec![third]);
    assert!(!host.live_streams().contains(&first));
    assert!(controller.discarded_streams().is_empty());
    assert_eq!(controller.state(), LifecycleState::OpenRunning);
}

#[test]
fn shutdown_then_restart_from_scratch() {
    let (host, mut controller) = started(ReinitPolicy::Close);
    controller.shutdown().expect("shutdown");
    assert_eq!(controller.state(), LifecycleState::SubsystemShutdown);
    assert!(!host.is_initialized());

    assert!(matches!(
        controller.reinitialize(),
        Err(LifecycleError::InvalidState { op: "reinitialize", .. })
    ));

    let stream = controller.full_restart().expect("restart from shutdown");
    assert_eq!(host.is_running(stream), Some(true));
}

#[test]
fn subsystem_init_failure_is_reported() {
    let host = LoopbackHost::new();
    host.fail_next(HostOp::InitSubsystem);
    let mut controller = DeviceLifecycleController::from_config(host.clone(), &HarnessConfig::default());

    let err = controller.start().unwrap_err();
    assert!(matches!(err, LifecycleError::SubsystemInit(HostError::Injected(_))));
    assert_eq!(controller.state(), LifecycleState::SubsystemShutdown);

    controller.start().expect("second attempt succeeds");
}

#[test]
fn open_failure_during_reinit_leaves_controller_unopened() {
    let (host, mut controller) = started(ReinitPolicy::Close);
    host.fail_next(HostOp::OpenStream);

    let err = controller.reinitialize().unwrap_err();
    assert!(matches!(err, LifecycleError::StreamOpen(_)));
    assert_eq!(controller.state(), LifecycleState::Unopened);
    assert_eq!(controller.current_stream(), None);

    controller.reinitialize().expect("retry by operator");
    assert_eq!(controller.state(), LifecycleState::OpenRunning);
}

#[test]
fn resume_failure_leaves_stream_paused() {
    let host = LoopbackHost::new();
    host.fail_next(HostOp::Resume);
    let mut controller = DeviceLifecycleController::from_config(host.clone(), &HarnessConfig::default());

    let err = controller.start().unwrap_err();
    match err {
        LifecycleError::StreamControl { op, .. } => assert_eq!(op, ControlOp::Resume),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(controller.state(), LifecycleState::OpenPaused);
}

#[test]
fn close_failure_aborts_full_restart() {
    let (host, mut controller) = started(ReinitPolicy::Discard);
    host.fail_next(HostOp::Close);

    let err = controller.full_restart().unwrap_err();
    assert!(matches!(err, LifecycleError::StreamControl { op: ControlOp::Close, .. }));
    assert_eq!(controller.state(), LifecycleState::OpenPaused);
    assert!(host.is_initialized());
}
