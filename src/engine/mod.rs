//! A translation engine: its permanent layout, runtime dirs and training components.

pub mod domains;
pub mod xconf;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::collab::{Collaborators, ExternalPreprocessor, ExternalTool};
use crate::config::{CommandSpec, TrainSettings};
use crate::error::{Result, TrainError};
use crate::pipeline::LogSink;

pub use domains::{BaselineDatabase, Domain};
pub use xconf::EngineConfig;

const CONFIG_FILENAME: &str = "engine.xconf";

/// Permanent model locations under `<engine>/models`.
#[derive(Clone, Debug)]
pub struct ModelPaths {
    pub vocabulary: PathBuf,
    pub align: PathBuf,
    pub context: PathBuf,
    pub decoder: PathBuf,
    pub lm: PathBuf,
    pub sapt: PathBuf,
    pub db: PathBuf,
}

impl ModelPaths {
    fn under(models: &Path) -> Self {
        let decoder = models.join("decoder");
        Self {
            vocabulary: models.join("vocabulary"),
            align: models.join("align"),
            context: models.join("context"),
            lm: decoder.join("lm"),
            sapt: decoder.join("sapt"),
            db: models.join("db"),
            decoder,
        }
    }
}

pub struct Engine {
    name: String,
    config: EngineConfig,

    path: PathBuf,
    data_path: PathBuf,
    models_path: PathBuf,
    config_file: PathBuf,
    models: ModelPaths,

    runtime_path: PathBuf,
    logs_path: PathBuf,
    temp_path: PathBuf,

    collaborators: Collaborators,
}

impl Engine {
    pub const DEFAULT_NAME: &'static str = "default";

    /// Describe engine `name` (`default` when `None`) under the configured roots.
    ///
    /// Nothing is created on disk. Without `config` a fresh one with every feature
    /// enabled is used.
    pub fn new(
        settings: &TrainSettings,
        name: Option<&str>,
        source_lang: &str,
        target_lang: &str,
        config: Option<EngineConfig>,
    ) -> Self {
        let name = name.unwrap_or(Self::DEFAULT_NAME).to_string();
        let config = config.unwrap_or_else(|| EngineConfig::new(&name, source_lang, target_lang));

        let path = settings.engines_dir.join(&name);
        let models_path = path.join("models");
        let models = ModelPaths::under(&models_path);
        let runtime_path = settings.runtime_dir.join(&name);
        let collaborators = command_collaborators(settings, &config, &models_path, &models);

        Self {
            config_file: path.join(CONFIG_FILENAME),
            data_path: path.join("data"),
            logs_path: runtime_path.join("logs"),
            temp_path: runtime_path.join("tmp"),
            name,
            config,
            path,
            models_path,
            models,
            runtime_path,
            collaborators,
        }
    }

    /// Load an existing engine from its `engine.xconf`.
    pub fn load(settings: &TrainSettings, name: &str) -> Result<Self> {
        let config_file = settings.engines_dir.join(name).join(CONFIG_FILENAME);
        if !config_file.is_file() {
            return Err(TrainError::InvalidArgument(format!("Engine '{name}' not found")));
        }
        let config = EngineConfig::from_file(name, &config_file)?;
        let (source_lang, target_lang) = (config.source_lang.clone(), config.target_lang.clone());
        Ok(Self::new(
            settings,
            Some(name),
            &source_lang,
            &target_lang,
            Some(config),
        ))
    }

    /// Names of the engines with a config file, sorted.
    pub fn list(settings: &TrainSettings) -> Result<Vec<String>> {
        let dir = &settings.engines_dir;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TrainError::storage("list engines", dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TrainError::storage("list engines", dir, e))?;
            if !entry.path().join(CONFIG_FILENAME).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Swap in a different set of training components.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_lang(&self) -> &str {
        &self.config.source_lang
    }

    pub fn target_lang(&self) -> &str {
        &self.config.target_lang
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn models_path(&self) -> &Path {
        &self.models_path
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime_path
    }

    pub fn exists(&self) -> bool {
        self.config_file.is_file()
    }

    pub fn models(&self) -> &ModelPaths {
        &self.models
    }

    pub fn domains(&self) -> BaselineDatabase {
        BaselineDatabase::new(&self.models.db)
    }

    /// Wipe the permanent engine directory and recreate it empty.
    pub fn reset_dirs(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(TrainError::storage("wipe engine dir", &self.path, e));
            }
            _ => {}
        }
        fs::create_dir_all(&self.path)
            .map_err(|e| TrainError::storage("create engine dir", &self.path, e))
    }

    /// Write decoder configs, then `engine.xconf`.
    pub fn write_configs(&self, log: &LogSink) -> Result<()> {
        self.collaborators.decoder_config.create_configs(log)?;
        self.config.store(&self.config_file)
    }

    /// `<runtime>/logs/<name>.log`, with the logs dir created and any stale file removed.
    pub fn log_file(&self, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.logs_path)
            .map_err(|e| TrainError::storage("create logs dir", &self.logs_path, e))?;
        let file = self.logs_path.join(format!("{name}.log"));
        match fs::remove_file(&file) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(TrainError::storage("remove stale log", &file, e))
            }
            _ => Ok(file),
        }
    }

    /// `<runtime>/tmp/<name>`; with `ensure` it is wiped and recreated empty.
    pub fn temp_dir(&self, name: &str, ensure: bool) -> Result<PathBuf> {
        let dir = self.temp_path.join(name);
        if ensure {
            match fs::remove_dir_all(&dir) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    return Err(TrainError::storage("clear temp dir", &dir, e));
                }
                _ => {}
            }
            fs::create_dir_all(&dir).map_err(|e| TrainError::storage("create temp dir", &dir, e))?;
        }
        Ok(dir)
    }
}

fn command_collaborators(
    settings: &TrainSettings,
    config: &EngineConfig,
    models_path: &Path,
    models: &ModelPaths,
) -> Collaborators {
    let c = &settings.collaborators;
    let tool = |stage, spec: &Option<CommandSpec>, model: &Path| {
        ExternalTool::new(stage, spec.clone(), &config.source_lang, &config.target_lang, model)
    };
    Collaborators {
        cleaner: Box::new(tool("cleaner", &c.cleaner, models_path)),
        preprocessor: Box::new(ExternalPreprocessor {
            process: tool("preprocessor", &c.preprocessor, &models.vocabulary),
            clean: tool("preprocessor_clean", &c.preprocessor_clean, models_path),
        }),
        context_analyzer: Box::new(tool("context_analyzer", &c.context_analyzer, &models.context)),
        aligner: Box::new(tool("aligner", &c.aligner, &models.align)),
        phrase_table: Box::new(tool("phrase_table", &c.phrase_table, &models.sapt)),
        language_model: Box::new(tool("language_model", &c.language_model, &models.lm)),
        decoder_config: Box::new(tool("decoder_config", &c.decoder_config, &models.decoder)),
    }
}
