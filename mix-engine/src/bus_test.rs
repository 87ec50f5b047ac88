use std::{sync::Arc, time::Duration};

use super::MixBus;
use crate::{
    codec::{BgColor, CodecType},
    engine::{PipelineState, VideoMixEngine},
    error::MixError,
    passthrough::PassthroughBackend,
    registry::InputProducer,
    settings::MixSettings,
    testing::{HwEvent, KeyframeCounter, Recorder},
};

fn recording_bus() -> (MixBus, Recorder) {
    let recorder = Recorder::default();
    let engine = VideoMixEngine::new(recorder.backend(), MixSettings::default());
    (MixBus::new("test", engine), recorder)
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[tokio::test]
async fn test_bus_walks_the_state_machine() -> anyhow::Result<()> {
    let (bus, recorder) = recording_bus();
    assert_eq!(bus.state().await?, PipelineState::Uninitialized);
    assert!(matches!(
        bus.enable_input(CodecType::Vp8, None).await,
        Err(MixError::NotInitialized)
    ));

    bus.initialize(BgColor::BLACK, 640, 360).await?;
    let input = bus.enable_input(CodecType::Vp8, None).await?;
    assert_eq!(bus.state().await?, PipelineState::WaitingForOutput);

    let output = bus.enable_output(CodecType::Avc, 800, None).await?;
    assert_eq!(bus.state().await?, PipelineState::InService);
    assert_eq!(recorder.count(|e| matches!(e, HwEvent::Open { .. })), 1);

    assert!(matches!(
        bus.enable_output(CodecType::Avc, 400, None).await,
        Err(MixError::CodecConflict(CodecType::Avc))
    ));

    bus.set_bitrate(output, 1200).await?;
    bus.force_keyframe(output).await?;
    bus.set_resolution(1280, 720).await?;
    assert_eq!(
        recorder.count(|e| matches!(e, HwEvent::SetBitrate(_, 1200))),
        1
    );
    assert_eq!(
        recorder.count(|e| matches!(e, HwEvent::SetResolution(1280, 720))),
        1
    );

    bus.disable_input(input).await?;
    assert_eq!(bus.state().await?, PipelineState::WaitingForInput);
    assert_eq!(recorder.count(|e| matches!(e, HwEvent::Stop)), 1);
    Ok(())
}

#[tokio::test]
async fn test_bus_reports_producer_keyframe_requests() -> anyhow::Result<()> {
    let (bus, _recorder) = recording_bus();
    let counter = Arc::new(KeyframeCounter::default());
    let producer: Arc<dyn InputProducer> = counter.clone();

    bus.initialize(BgColor::BLACK, 640, 360).await?;
    bus.enable_output(CodecType::Vp8, 500, None).await?;
    let input = bus.enable_input(CodecType::Vp8, Some(producer)).await?;
    assert_eq!(counter.count(input), 1);
    Ok(())
}

#[tokio::test]
async fn test_stopped_bus_rejects_requests_and_releases_hardware() -> anyhow::Result<()> {
    let (bus, recorder) = recording_bus();
    bus.initialize(BgColor::BLACK, 640, 360).await?;
    bus.enable_input(CodecType::Vp8, None).await?;
    bus.enable_output(CodecType::Vp9, 500, None).await?;

    bus.stop();
    assert!(matches!(bus.state().await, Err(MixError::BusClosed)));
    assert!(
        wait_until(|| recorder.count(|e| matches!(e, HwEvent::Stop)) == 1).await,
        "session not stopped after bus shutdown"
    );
    Ok(())
}

#[tokio::test]
async fn test_shutdown_waits_for_session_release() -> anyhow::Result<()> {
    let (bus, recorder) = recording_bus();
    bus.initialize(BgColor::BLACK, 640, 360).await?;
    bus.enable_output(CodecType::Hevc, 500, None).await?;
    bus.enable_input(CodecType::Avc, None).await?;

    bus.shutdown().await;
    assert_eq!(recorder.count(|e| matches!(e, HwEvent::Stop)), 1);
    Ok(())
}

#[tokio::test]
async fn test_passthrough_end_to_end() -> anyhow::Result<()> {
    let engine = VideoMixEngine::new(PassthroughBackend::new(), MixSettings::default());
    let bus = MixBus::new("passthrough", engine);
    bus.initialize(BgColor::BLACK, 320, 240).await?;

    let input = bus.enable_input(CodecType::Vp8, None).await?;
    let output = bus.enable_output(CodecType::Vp8, 300, None).await?;
    assert_eq!(bus.pull_block(output), None);

    bus.push_input(input, b"frame-0");
    let mut received = None;
    let found = wait_until(|| {
        received = bus.pull_block(output);
        received.is_some()
    })
    .await;
    assert!(found, "no block forwarded");
    assert_eq!(received.as_deref(), Some(&b"frame-0"[..]));

    let stats = bus.stats();
    assert_eq!(stats.pushed_bytes, 7 + 4);
    assert_eq!(stats.bootstraps, 1);

    bus.disable_output(output).await?;
    let mut buf = [0u8; 64];
    bus.push_input(input, b"frame-1");
    assert_eq!(bus.pull_output(output, &mut buf), 0);
    assert_eq!(bus.state().await?, PipelineState::WaitingForOutput);
    Ok(())
}
