use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILENAME: &str = "mmt-train.toml";
pub const CONFIG_ENV_VAR: &str = "MMT_TRAIN_CONFIG";

/// Corpus megabytes one gigabyte of free RAM is expected to handle.
pub const DEFAULT_RAM_RATIO_MB: u64 = 350;
/// Free disk recommended, as a multiple of the corpus size.
pub const DEFAULT_DISK_FACTOR: u64 = 10;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub training: TrainingSection,
    #[serde(default)]
    pub collaborators: CollaboratorsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PathsSection {
    /// Where permanent engines live (`<engines_dir>/<name>`).
    #[serde(default)]
    pub engines_dir: Option<PathBuf>,
    /// Where logs and temporary training data live (`<runtime_dir>/<name>`).
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TrainingSection {
    #[serde(default)]
    pub ram_ratio_mb: Option<u64>,
    #[serde(default)]
    pub disk_factor: Option<u64>,
    /// Extract dev/test sets out of the training corpora during preprocessing.
    #[serde(default)]
    pub split_trainingset: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CollaboratorsSection {
    #[serde(default)]
    pub cleaner: Option<CommandSpec>,
    #[serde(default)]
    pub preprocessor: Option<CommandSpec>,
    #[serde(default)]
    pub preprocessor_clean: Option<CommandSpec>,
    #[serde(default)]
    pub context_analyzer: Option<CommandSpec>,
    #[serde(default)]
    pub aligner: Option<CommandSpec>,
    #[serde(default)]
    pub phrase_table: Option<CommandSpec>,
    #[serde(default)]
    pub language_model: Option<CommandSpec>,
    #[serde(default)]
    pub decoder_config: Option<CommandSpec>,
}

/// An external program plus its argument template (`{{output}}`, `{{inputs}}`, ...).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Configuration with every default applied and every relative path resolved.
#[derive(Clone, Debug)]
pub struct TrainSettings {
    pub config_path: PathBuf,
    pub engines_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub ram_ratio_mb: u64,
    pub disk_factor: u64,
    pub split_trainingset: bool,
    pub collaborators: CollaboratorsSection,
}

impl TrainSettings {
    pub fn resolve(cfg: &AppConfig, config_path: &Path) -> Self {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let rel = |p: &Option<PathBuf>, default: &str| {
            let p = p.clone().unwrap_or_else(|| PathBuf::from(default));
            if p.is_relative() {
                config_dir.join(p)
            } else {
                p
            }
        };

        Self {
            config_path: config_path.to_path_buf(),
            engines_dir: rel(&cfg.paths.engines_dir, "engines"),
            runtime_dir: rel(&cfg.paths.runtime_dir, "runtime"),
            ram_ratio_mb: cfg
                .training
                .ram_ratio_mb
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_RAM_RATIO_MB),
            disk_factor: cfg.training.disk_factor.unwrap_or(DEFAULT_DISK_FACTOR),
            split_trainingset: cfg.training.split_trainingset.unwrap_or(true),
            collaborators: cfg.collaborators.clone(),
        }
    }

    /// Settings rooted at `dir`, as if an empty config file lived there.
    pub fn with_root(dir: &Path) -> Self {
        Self::resolve(&AppConfig::default(), &dir.join(DEFAULT_CONFIG_FILENAME))
    }

    /// `--config`, then `$MMT_TRAIN_CONFIG`, then an upward search; defaults otherwise.
    pub fn discover(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cfg_file = explicit
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&cwd, DEFAULT_CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILENAME));
        Ok(Self::resolve(&file_cfg, &cfg_path))
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[paths]
engines_dir = "engines"
runtime_dir = "runtime"

[training]
# 1G of free RAM recommended for every `ram_ratio_mb` megabytes of corpora.
ram_ratio_mb = 350
# Free disk recommended, as a multiple of the corpora size.
disk_factor = 10
# Extract dev/test sets from the training corpora (into <engine>/data).
split_trainingset = true

# External tools, one per training stage. Available placeholders:
#   {{input}}         input directory of the stage
#   {{inputs}}        input corpus files, one argument each (must be a whole argument)
#   {{output}}        output/working directory of the stage
#   {{source_lang}}   {{target_lang}}
#   {{model}}         permanent model path of the stage
#   {{aligner_model}} aligner model path (phrase table only)
#   {{data}}          dev/test extraction directory (preprocessor only); as a whole
#                     argument it is dropped when split_trainingset is disabled
# A stage without a configured tool fails when it has to run.

[collaborators.cleaner]
program = "mmt-cleaner"
args = ["--source", "{{source_lang}}", "--target", "{{target_lang}}", "--input", "{{input}}", "--output", "{{output}}"]

[collaborators.preprocessor]
program = "mmt-preprocess"
args = ["--source", "{{source_lang}}", "--target", "{{target_lang}}", "--input", "{{input}}", "--output", "{{output}}", "--vocabulary", "{{model}}", "{{data}}"]

[collaborators.preprocessor_clean]
program = "mmt-cleaner"
args = ["--source", "{{source_lang}}", "--target", "{{target_lang}}", "--input", "{{input}}", "--output", "{{output}}"]

[collaborators.context_analyzer]
program = "mmt-context-index"
args = ["--index", "{{model}}", "--corpora", "{{input}}"]

[collaborators.aligner]
program = "fastalign-build"
args = ["--model", "{{model}}", "--input", "{{input}}", "--source", "{{source_lang}}", "--target", "{{target_lang}}", "--workdir", "{{output}}"]

[collaborators.phrase_table]
program = "sapt-build"
args = ["--model", "{{model}}", "--aligner", "{{aligner_model}}", "--input", "{{input}}", "--workdir", "{{output}}"]

[collaborators.language_model]
program = "ilm-build"
args = ["--model", "{{model}}", "--lang", "{{target_lang}}", "--workdir", "{{output}}", "{{inputs}}"]

# [collaborators.decoder_config]
# program = "mmt-decoder-config"
# args = ["--model", "{{model}}"]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let cfg: AppConfig = toml::from_str(
            r#"
[paths]
engines_dir = "e"
runtime_dir = "/var/mmt"

[training]
ram_ratio_mb = 500
"#,
        )
        .expect("parse");
        let settings = TrainSettings::resolve(&cfg, Path::new("/opt/mmt/mmt-train.toml"));
        assert_eq!(settings.engines_dir, PathBuf::from("/opt/mmt/e"));
        assert_eq!(settings.runtime_dir, PathBuf::from("/var/mmt"));
        assert_eq!(settings.ram_ratio_mb, 500);
        assert_eq!(settings.disk_factor, DEFAULT_DISK_FACTOR);
        assert!(settings.split_trainingset);
    }

    #[test]
    fn zero_ram_ratio_falls_back_to_default() {
        let mut cfg = AppConfig::default();
        cfg.training.ram_ratio_mb = Some(0);
        let settings = TrainSettings::resolve(&cfg, Path::new("mmt-train.toml"));
        assert_eq!(settings.ram_ratio_mb, DEFAULT_RAM_RATIO_MB);
    }

    #[test]
    fn default_config_parses() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = init_default_config(tmp.path(), false).expect("init");
        let cfg = load_config(&path).expect("load");
        let cleaner = cfg.collaborators.cleaner.expect("cleaner");
        assert_eq!(cleaner.program, "mmt-cleaner");
        assert!(cfg.collaborators.decoder_config.is_none());
    }

    #[test]
    fn init_keeps_existing_file_unless_forced() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join(DEFAULT_CONFIG_FILENAME);
        std::fs::write(&path, "[training]\nram_ratio_mb = 1\n").expect("write");

        init_default_config(tmp.path(), false).expect("init");
        assert!(std::fs::read_to_string(&path).expect("read").contains("ram_ratio_mb = 1"));

        init_default_config(tmp.path(), true).expect("init");
        assert!(std::fs::read_to_string(&path).expect("read").contains("ram_ratio_mb = 350"));
    }
}
