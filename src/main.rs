use std::time::Duration;

use anyhow::Context;
use mix_engine::{MixBus, VideoMixEngine, passthrough::PassthroughBackend};
use tokio_util::sync::CancellationToken;

mod config;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("mix_engine", log::LevelFilter::Debug)
        .init();
}

fn start_stats_reporter(bus: &MixBus, interval_secs: u64, cancel: CancellationToken) {
    let data = bus.data_plane();
    let period = Duration::from_secs(interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                },
                _ = ticker.tick() => {
                    match serde_json::to_string(&data.stats()) {
                        Ok(stats) => log::info!("stats {}", stats),
                        Err(e) => log::warn!("serialize stats error: {}", e),
                    }
                },
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = config::config();

    let engine = VideoMixEngine::new(PassthroughBackend::new(), config.settings.clone());
    let bus = MixBus::new("mixer", engine);
    bus.initialize(config.background, config.width, config.height)
        .await
        .context("initialize mixer")?;

    for codec in &config.inputs {
        let index = bus
            .enable_input(*codec, None)
            .await
            .with_context(|| format!("enable {} input", codec))?;
        log::info!("{} ready ({})", index, codec);
    }
    for output in &config.outputs {
        let index = bus
            .enable_output(output.codec, output.bitrate, None)
            .await
            .with_context(|| format!("enable {} output", output.codec))?;
        log::info!("{} ready ({} @ {} kbps)", index, output.codec, output.bitrate);
    }
    log::info!("mixer state {:?}", bus.state().await?);

    let cancel = CancellationToken::new();
    start_stats_reporter(&bus, config.stats_interval_secs, cancel.clone());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    bus.shutdown().await;
    Ok(())
}
