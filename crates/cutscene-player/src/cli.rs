use std::path::PathBuf;

use clap::Parser;
use cutscene_player::{MediaRef, PlaybackRequest, PlayerSettings};

#[derive(Debug, Parser)]
#[command(
    name = "cutscene-player",
    about = "Play a palette-animation cutscene with its audio track",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Resource root laid out as <root>/<language>/<path>.<ext>
    #[arg(long = "root")]
    pub root: Option<PathBuf>,

    /// Language of the video
    #[arg(short = 'l', long = "language", default_value = "en")]
    pub language: String,

    /// Language of the audio track and subtitles (defaults to --language)
    #[arg(long = "audio-language")]
    pub audio_language: Option<String>,

    /// First frame to present; earlier frames are decoded silently
    #[arg(long = "skip", default_value_t = 0)]
    pub skip: u32,

    /// Audio smoothing window in samples (0 disables)
    #[arg(long = "filter")]
    pub filter: Option<usize>,

    /// Output volume (0-100)
    #[arg(long = "volume", value_parser = parse_volume)]
    pub volume: Option<u8>,

    /// Play the video without audio
    #[arg(long = "no-audio")]
    pub no_audio: bool,

    /// Store the effective root, audio language, filter and volume as defaults
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Logical clip path without extension, e.g. intro/start
    pub path: String,
}

impl CliArgs {
    /// The clip to play, with `settings` already merged over the flags.
    pub fn request(&self, settings: &PlayerSettings) -> PlaybackRequest {
        let audio_language = settings
            .audio_language
            .clone()
            .unwrap_or_else(|| self.language.clone());
        let voice = MediaRef::new(audio_language, self.path.as_str());
        let request = PlaybackRequest::new(MediaRef::new(self.language.as_str(), self.path.as_str()))
            .with_subtitle(voice.clone())
            .resume_at(self.skip)
            .with_filter(settings.filter_strength);
        if self.no_audio {
            request
        } else {
            request.with_audio(voice)
        }
    }
}

fn parse_volume(value: &str) -> Result<u8, String> {
    match value.parse::<u8>() {
        Ok(v) if v <= 100 => Ok(v),
        _ => Err(format!("'{value}' is not a volume between 0 and 100")),
    }
}
