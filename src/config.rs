//! Runtime configuration for a translation run.
//!
//! Bridges CLI arguments to the working-directory layout: everything for one
//! run lives under `.verso/<input stem>/` next to the input document, so two
//! documents in the same directory never share state.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::completion::ReasoningEffort;

/// Bounded retry parameters for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
    /// Model used for the completion-verification calls. A cheaper model is
    /// acceptable here; defaults to the main model.
    pub verifier_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub custom_instructions: Option<String>,
    pub skip_review: bool,
    pub work_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn new(
        input_path: PathBuf,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let input_path = input_path
            .canonicalize()
            .with_context(|| format!("input file not found: {}", input_path.display()))?;
        let work_dir = Self::work_dir_for(&input_path)?;

        let model = model.into();
        Ok(Self {
            input_path,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            verifier_model: model.clone(),
            model,
            temperature: 0.7,
            max_output_tokens: 16_384,
            reasoning_effort: None,
            custom_instructions: None,
            skip_review: false,
            work_dir,
            retry: RetryPolicy::default(),
        })
    }

    /// Working directory for a given input document, without building a full
    /// config. Used by the status and reset commands.
    pub fn work_dir_for(input_path: &Path) -> Result<PathBuf> {
        let input_path = input_path
            .canonicalize()
            .with_context(|| format!("input file not found: {}", input_path.display()))?;
        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("input file has no usable name")?
            .to_string();
        Ok(input_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".verso")
            .join(stem))
    }

    pub fn session_path(&self) -> PathBuf {
        self.work_dir.join("session.json")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.work_dir.join("artifacts")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.work_dir.join("metrics.json")
    }

    /// Final output next to the input: original stem, target language,
    /// original extension (`novel.txt` -> `novel.french.txt`).
    pub fn final_output_path(&self) -> PathBuf {
        let stem = self
            .input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let lang = self
            .target_lang
            .to_lowercase()
            .replace(char::is_whitespace, "-");
        let name = match self.input_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{lang}.{ext}"),
            None => format!("{stem}.{lang}"),
        };
        self.input_path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config_for(name: &str) -> (Config, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let input = dir.path().join(name);
        fs::write(&input, "source text").unwrap();
        let config = Config::new(input, "English", "French", "gpt-4o").unwrap();
        (config, dir)
    }

    #[test]
    fn work_dir_is_scoped_to_input_stem() {
        let (config, _dir) = config_for("novel.txt");
        assert!(config.work_dir.ends_with(".verso/novel"));
        assert!(config.session_path().ends_with(".verso/novel/session.json"));
    }

    #[test]
    fn final_output_combines_stem_language_extension() {
        let (config, _dir) = config_for("novel.txt");
        assert_eq!(
            config.final_output_path().file_name().unwrap(),
            "novel.french.txt"
        );
    }

    #[test]
    fn final_output_without_extension() {
        let (config, _dir) = config_for("README");
        assert_eq!(
            config.final_output_path().file_name().unwrap(),
            "README.french"
        );
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(Config::new(PathBuf::from("/no/such/file.txt"), "en", "fr", "gpt-4o").is_err());
    }

    #[test]
    fn multiword_language_is_slugged() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("a.md");
        fs::write(&input, "x").unwrap();
        let config = Config::new(input, "English", "Brazilian Portuguese", "gpt-4o").unwrap();
        assert_eq!(
            config.final_output_path().file_name().unwrap(),
            "a.brazilian-portuguese.md"
        );
    }
}
