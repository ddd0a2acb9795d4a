//! Audio playback backends

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::SoundConfig;
use crate::error::{Error, Result};

/// Plays a sound reference at a volume in [0, 1]
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Play one sound to completion
    async fn play(&self, sound: &str, volume: f32) -> Result<()>;
}

const BUNDLED_EXTENSIONS: [&str; 4] = ["aiff", "wav", "ogg", "mp3"];

/// How a player binary expects its volume argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeArg {
    /// `afplay -v <0..1>`
    Afplay,
    /// `paplay --volume=<0..65536>`
    Paplay,
    /// `ffplay -volume <0..100>`
    Ffplay,
    /// Player has no volume flag
    Unsupported,
}

impl VolumeArg {
    fn for_program(program: &str) -> Self {
        let name = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program);
        match name {
            "afplay" => Self::Afplay,
            "paplay" => Self::Paplay,
            "ffplay" => Self::Ffplay,
            _ => Self::Unsupported,
        }
    }

    fn args(self, volume: f32) -> Vec<String> {
        let volume = volume.clamp(0.0, 1.0);
        match self {
            Self::Afplay => vec!["-v".to_string(), format!("{volume:.2}")],
            Self::Paplay => vec![format!("--volume={}", (volume * 65536.0).round() as u32)],
            Self::Ffplay => vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                "-volume".to_string(),
                format!("{}", (volume * 100.0).round() as u32),
            ],
            Self::Unsupported => Vec::new(),
        }
    }
}

/// Plays sounds by spawning a platform player binary.
///
/// The player is picked once at construction: the configured override, else
/// `afplay` on macOS and `paplay` elsewhere.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    volume_arg: VolumeArg,
    sounds_dir: PathBuf,
    timeout: Duration,
}

impl CommandPlayer {
    /// Build a player from the sound configuration
    pub fn from_config(config: &SoundConfig) -> Self {
        let program = config
            .player
            .clone()
            .unwrap_or_else(|| Self::platform_default().to_string());
        let sounds_dir = config.sounds_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "ccbell")
                .map(|dirs| dirs.data_dir().join("sounds"))
                .unwrap_or_else(|| PathBuf::from("sounds"))
        });

        Self {
            volume_arg: VolumeArg::for_program(&program),
            program,
            sounds_dir,
            timeout: config.play_timeout,
        }
    }

    fn platform_default() -> &'static str {
        if cfg!(target_os = "macos") {
            "afplay"
        } else {
            "paplay"
        }
    }

    /// Player binary in use
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolve `bundled:<name>`, `custom:<path>` or a bare path to an existing file
    pub async fn resolve(&self, sound: &str) -> Result<PathBuf> {
        let path = if let Some(name) = sound.strip_prefix("bundled:") {
            let mut found = None;
            for ext in BUNDLED_EXTENSIONS {
                let candidate = self.sounds_dir.join(format!("{name}.{ext}"));
                if is_file(&candidate).await {
                    found = Some(candidate);
                    break;
                }
            }
            found.ok_or_else(|| {
                Error::dispatch(
                    "command-player",
                    format!("bundled sound '{name}' not found in {}", self.sounds_dir.display()),
                )
            })?
        } else {
            let path = PathBuf::from(sound.strip_prefix("custom:").unwrap_or(sound));
            if !is_file(&path).await {
                return Err(Error::dispatch(
                    "command-player",
                    format!("sound file {} does not exist", path.display()),
                ));
            }
            path
        };
        Ok(path)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl AudioBackend for CommandPlayer {
    async fn play(&self, sound: &str, volume: f32) -> Result<()> {
        let path = self.resolve(sound).await?;

        let mut child = Command::new(&self.program)
            .args(self.volume_arg.args(volume))
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::dispatch("command-player", format!("{}: {e}", self.program)))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| Error::dispatch("command-player", "playback timed out"))?
            .map_err(|e| Error::dispatch("command-player", e))?;

        if !status.success() {
            return Err(Error::dispatch(
                "command-player",
                format!("{} exited with {status}", self.program),
            ));
        }

        debug!(sound = %sound, path = %path.display(), volume, "Played sound");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn player_in(dir: &Path, program: &str) -> CommandPlayer {
        CommandPlayer::from_config(&SoundConfig {
            player: Some(program.to_string()),
            sounds_dir: Some(dir.to_path_buf()),
            ..SoundConfig::default()
        })
    }

    #[rstest]
    #[case("afplay", 0.5, vec!["-v", "0.50"])]
    #[case("/usr/bin/paplay", 1.0, vec!["--volume=65536"])]
    #[case("paplay", 2.0, vec!["--volume=65536"])]
    #[case("aplay", 0.3, vec![])]
    fn test_volume_args(#[case] program: &str, #[case] volume: f32, #[case] expected: Vec<&str>) {
        assert_eq!(VolumeArg::for_program(program).args(volume), expected);
    }

    #[tokio::test]
    async fn test_resolve_bundled_and_custom() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stop.wav"), b"RIFF").unwrap();
        let player = player_in(dir.path(), "paplay");

        assert_eq!(player.resolve("bundled:stop").await.unwrap(), dir.path().join("stop.wav"));

        let custom = format!("custom:{}", dir.path().join("stop.wav").display());
        assert!(player.resolve(&custom).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_missing_sound_is_dispatch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let player = player_in(dir.path(), "paplay");

        assert!(matches!(
            player.resolve("bundled:nope").await,
            Err(Error::DispatchFailed { .. })
        ));
        assert!(player.resolve("/definitely/not/here.wav").await.is_err());
        std::fs::create_dir(dir.path().join("folder.wav")).unwrap();
        assert!(player.resolve("bundled:folder").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_player_binary_is_dispatch_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stop.wav"), b"RIFF").unwrap();
        let player = player_in(dir.path(), "/nonexistent/player-xyz");

        let err = player.play("bundled:stop", 0.5).await.unwrap_err();
        assert!(matches!(err, Error::DispatchFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_playback_with_true_binary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stop.wav"), b"RIFF").unwrap();
        let player = player_in(dir.path(), "true");

        player.play("bundled:stop", 0.5).await.unwrap();
    }
}
