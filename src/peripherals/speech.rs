// src/peripherals/speech.rs
//
// Speech backends. `HttpSpeech` synthesises through a TTS endpoint into a
// content-addressed cache, falls back to a local synthesiser command when
// the endpoint fails, and plays the result with an external player. Every
// external step carries a timeout.

use crate::error::PeripheralError;
use crate::types::SpeechConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type SpeechFuture = Pin<Box<dyn Future<Output = Result<(), PeripheralError>> + Send>>;

pub trait SpeechBackend: Send + Sync + 'static {
    /// Synthesise and play `text` to completion.
    fn speak(&self, text: String) -> SpeechFuture;
}

/// Logs the announcement instead of speaking it.
#[derive(Debug, Default)]
pub struct SilentSpeech;

impl SpeechBackend for SilentSpeech {
    fn speak(&self, text: String) -> SpeechFuture {
        Box::pin(async move {
            info!("🔈 (speech disabled) {}", text);
            Ok(())
        })
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    lang: &'a str,
}

#[derive(Clone)]
pub struct HttpSpeech {
    http_client: reqwest::Client,
    config: SpeechConfig,
}

impl HttpSpeech {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.synth_timeout_secs))
            .build()
            .context("Failed to build speech HTTP client")?;
        Ok(Self { http_client, config })
    }

    /// Cache file for `text`; the same text and language always map to the same file.
    pub fn cache_path(&self, text: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        self.config.language.hash(&mut hasher);
        text.hash(&mut hasher);
        Path::new(&self.config.cache_dir).join(format!("{:016x}.mp3", hasher.finish()))
    }

    async fn synthesize(&self, text: &str) -> Result<PathBuf, PeripheralError> {
        let path = self.cache_path(text);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Using cached audio {}", path.display());
            return Ok(path);
        }
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;

        info!("🗣️ Requesting synthesis from {}", self.config.endpoint);
        let audio = self
            .http_client
            .post(&self.config.endpoint)
            .json(&SynthesisRequest {
                text,
                lang: &self.config.language,
            })
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        write_atomically(&path, &audio).await?;
        debug!("Cached {} bytes of audio at {}", audio.len(), path.display());
        Ok(path)
    }

    async fn synthesize_locally(&self, text: &str) -> Result<PathBuf, PeripheralError> {
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        let path = Path::new(&self.config.cache_dir).join("fallback.wav");
        let path_str = path.to_string_lossy().into_owned();
        run_command(
            &self.config.fallback,
            &["-w", path_str.as_str(), text],
            Duration::from_secs(self.config.synth_timeout_secs),
            "fallback synthesiser",
        )
        .await?;
        Ok(path)
    }

    async fn play(&self, path: &Path) -> Result<(), PeripheralError> {
        let path_str = path.to_string_lossy();
        run_command(
            &self.config.player,
            &[path_str.as_ref()],
            Duration::from_secs(self.config.play_timeout_secs),
            "audio player",
        )
        .await
    }

    async fn speak_inner(&self, text: String) -> Result<(), PeripheralError> {
        let audio = match self.synthesize(&text).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Speech endpoint failed ({}), trying local synthesiser", e);
                self.synthesize_locally(&text).await?
            }
        };
        self.play(&audio).await
    }
}

impl SpeechBackend for HttpSpeech {
    fn speak(&self, text: String) -> SpeechFuture {
        let this = self.clone();
        Box::pin(async move { this.speak_inner(text).await })
    }
}

/// Write through a sibling `.part` file so a reader never sees a truncated
/// cache entry.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PeripheralError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            debug!("No partial file to remove at {}: {}", partial.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Run `argv + extra` to completion within `limit`. The child is killed on timeout.
pub async fn run_command(
    argv: &[String],
    extra: &[&str],
    limit: Duration,
    what: &'static str,
) -> Result<(), PeripheralError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| PeripheralError::Unavailable(format!("{} command not configured", what)))?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .args(extra)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let status = tokio::time::timeout(limit, cmd.status())
        .await
        .map_err(|_| PeripheralError::Timeout(what))??;
    if !status.success() {
        return Err(PeripheralError::Command(program.clone(), status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> SpeechConfig {
        SpeechConfig {
            enabled: true,
            // nothing listens here
            endpoint: "http://127.0.0.1:9/tts".to_string(),
            cache_dir: dir.to_string_lossy().into_owned(),
            synth_timeout_secs: 2,
            play_timeout_secs: 2,
            player: vec!["true".to_string()],
            fallback: vec!["definitely-not-a-synthesiser".to_string()],
            ..SpeechConfig::default()
        }
    }

    #[test]
    fn test_cache_path_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let speech = HttpSpeech::new(config_in(dir.path())).unwrap();
        let a = speech.cache_path("move right");
        assert_eq!(a, speech.cache_path("move right"));
        assert_ne!(a, speech.cache_path("move left"));
        assert!(a.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_cached_audio_skips_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let speech = HttpSpeech::new(config_in(dir.path())).unwrap();
        let cached = speech.cache_path("hello");
        std::fs::write(&cached, b"ID3").unwrap();
        assert_eq!(speech.synthesize("hello").await.unwrap(), cached);
        speech.speak("hello".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_endpoint_and_fallback_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let speech = HttpSpeech::new(config_in(dir.path())).unwrap();
        let err = speech.speak("uncached".to_string()).await.unwrap_err();
        assert!(matches!(err, PeripheralError::Io(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        write_atomically(&path, b"ID3 audio").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3 audio");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("clip.mp3")]);
    }

    #[tokio::test]
    async fn test_failed_atomic_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way makes the final rename fail
        let path = dir.path().join("clip.mp3");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = write_atomically(&path, b"ID3").await.unwrap_err();
        assert!(matches!(err, PeripheralError::Io(_)));
        assert!(!dir.path().join("clip.mp3.part").exists());
        assert!(path.is_dir());

        let missing = dir.path().join("absent").join("clip.mp3");
        assert!(write_atomically(&missing, b"ID3").await.is_err());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let argv = vec!["sleep".to_string()];
        let err = run_command(&argv, &["5"], Duration::from_millis(100), "sleeper")
            .await
            .unwrap_err();
        assert!(matches!(err, PeripheralError::Timeout("sleeper")));
    }

    #[tokio::test]
    async fn test_run_command_unconfigured() {
        let err = run_command(&[], &[], Duration::from_secs(1), "player").await.unwrap_err();
        assert!(matches!(err, PeripheralError::Unavailable(_)));
    }
}
