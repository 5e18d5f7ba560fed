//! Local speech synthesis via the `espeak-ng` command

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::LocalTextToSpeech;
use crate::{Error, Result};

/// Fixed allowance on top of the per-character budget
const BASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Speaks through a local `espeak-ng` (or `espeak`) binary
#[derive(Debug, Clone)]
pub struct Espeak {
    program: PathBuf,
    rate: u32,
    voice: Option<String>,
}

impl Espeak {
    /// Locate `bin` on `PATH` (or accept it as a path)
    ///
    /// # Errors
    ///
    /// Returns error if the binary cannot be found
    pub fn locate(bin: &str, rate: u32, voice: Option<String>) -> Result<Self> {
        let program = which::which(bin).map_err(|e| {
            Error::Config(format!("local TTS binary '{bin}' not found: {e}"))
        })?;

        tracing::debug!(program = %program.display(), rate, voice = ?voice, "espeak located");

        Ok(Self {
            program,
            rate,
            voice,
        })
    }

    /// Path of the binary that will be run
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, text: &str) -> Vec<String> {
        let mut args = vec!["-s".to_string(), self.rate.to_string()];
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }
}

/// Upper bound for speaking `text`
fn speak_timeout(text: &str) -> Duration {
    BASE_TIMEOUT + Duration::from_millis(100 * text.chars().count() as u64)
}

#[async_trait]
impl LocalTextToSpeech for Espeak {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let limit = speak_timeout(text);
        let child = Command::new(&self.program)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to spawn espeak: {e}")))?;

        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| Error::Tts(format!("espeak timed out after {limit:?}")))??;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(code, stderr = %stderr, "espeak failed");
            return Err(Error::Tts(format!("espeak exited with code {code}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_rate_and_voice() {
        let espeak = Espeak {
            program: PathBuf::from("espeak-ng"),
            rate: 160,
            voice: Some("en-in".to_string()),
        };

        assert_eq!(
            espeak.args("hello"),
            vec!["-s", "160", "-v", "en-in", "--", "hello"]
        );
    }

    #[test]
    fn args_without_voice() {
        let espeak = Espeak {
            program: PathBuf::from("espeak-ng"),
            rate: 120,
            voice: None,
        };

        assert_eq!(espeak.args("-dash"), vec!["-s", "120", "--", "-dash"]);
    }

    #[test]
    fn missing_binary_is_config_error() {
        let err = Espeak::locate("definitely-not-a-real-tts-binary", 160, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn timeout_grows_with_text() {
        assert!(speak_timeout("a long sentence to speak") > speak_timeout("hi"));
    }

    #[tokio::test]
    async fn empty_text_is_a_no_op() {
        let espeak = Espeak {
            program: PathBuf::from("/nonexistent/espeak-ng"),
            rate: 160,
            voice: None,
        };

        espeak.speak("   ").await.unwrap();
    }
}
