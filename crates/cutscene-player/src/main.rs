mod cli;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;

use cli::CliArgs;
use cutscene_player::{
    AudioOutcome, CpalOutput, DirectoryLocator, Frame, PlaybackSession, PlayerSettings, Presenter,
    StreamHeader, VideoOutcome, format_position,
};

/// Prints the position label, and the subtitle whenever it changes.
struct LogPresenter {
    fps_millihz: u32,
    subtitle: Option<String>,
}

impl Presenter for LogPresenter {
    fn begin(&mut self, header: &StreamHeader) {
        self.fps_millihz = header.fps_millihz;
        log::info!(
            "{}x{}, {} frames @ {:.3} fps",
            header.width,
            header.height,
            header.frame_count,
            header.fps()
        );
    }

    fn present(&mut self, frame: Frame) {
        log::debug!("{}", format_position(frame.index, self.fps_millihz));
        if frame.subtitle != self.subtitle {
            if let Some(text) = &frame.subtitle {
                log::info!("[{}] {text}", format_position(frame.index, self.fps_millihz));
            }
            self.subtitle = frame.subtitle;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = CliArgs::parse();

    let mut settings = PlayerSettings::load();
    if let Some(root) = args.root.clone() {
        settings.resource_root = Some(root);
    }
    if let Some(filter) = args.filter {
        settings.filter_strength = filter;
    }
    if let Some(volume) = args.volume {
        settings.volume = volume;
    }
    if args.audio_language.is_some() {
        settings.audio_language.clone_from(&args.audio_language);
    }
    if args.save_settings {
        settings.save().context("failed to save settings")?;
    }

    let locator = DirectoryLocator::new(
        settings
            .resource_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(".")),
    );
    log::info!("Resource root: {}", locator.root().display());

    let presenter = Arc::new(Mutex::new(LogPresenter {
        fps_millihz: 1000,
        subtitle: None,
    }));
    let mut session = PlaybackSession::new(
        Arc::new(locator),
        Arc::new(CpalOutput),
        presenter,
    );
    session.set_volume(settings.volume);

    let (tx, rx) = crossbeam_channel::bounded(1);
    session.set_completion_handler(move |report| {
        let _ = tx.try_send(report);
    });

    let request = args.request(&settings);
    let clip = request.video.clone();

    session
        .play(request)
        .with_context(|| format!("cannot play {clip}"))?;
    let report = rx.recv().context("playback ended without a report")?;
    session.wait();

    match report.audio {
        Some(AudioOutcome::Disabled(e)) => log::warn!("Played without audio: {e}"),
        Some(AudioOutcome::Stopped) => log::warn!("Audio stopped early"),
        _ => {}
    }
    match report.video {
        VideoOutcome::Finished { frames_presented } => {
            log::info!("Done, {frames_presented} frames");
            Ok(())
        }
        VideoOutcome::Cancelled { frames_presented } => {
            bail!("playback cancelled after {frames_presented} frames")
        }
        VideoOutcome::Failed {
            frames_presented,
            error,
        } => Err(error).with_context(|| format!("playback failed after {frames_presented} frames")),
    }
}
