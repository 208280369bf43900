//! Drives one training attempt of an engine from raw corpora to final configs.

use std::path::PathBuf;

use crate::config::{TrainSettings, DEFAULT_DISK_FACTOR, DEFAULT_RAM_RATIO_MB};
use crate::corpus::{self, Corpus};
use crate::engine::Engine;
use crate::error::{Result, TrainError};
use crate::progress::ConsoleProgress;

use super::checkpoint::CheckpointStore;
use super::logger::BuildLogger;
use super::resources::{HostProbe, ResourceReport, SystemProbe};
use super::runner::StepRunner;
use super::steps::{self, Step, StepContext};
use super::workspace::Workspace;

const WORKSPACE_NAME: &str = "training";
const CHECKPOINT_FILENAME: &str = "checkpoint.json";
const CONFIG_STEP_DESCRIPTION: &str = "Writing config files";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Fresh,
    Resume,
}

/// Everything a running attempt owns.
pub struct Attempt {
    workspace: Workspace,
    checkpoint: CheckpointStore,
    logger: BuildLogger,
}

impl Attempt {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn logger(&self) -> &BuildLogger {
        &self.logger
    }
}

/// Training configuration of one engine. Nothing touches the disk until `build`,
/// `resume` or `start` is called.
pub struct EngineBuilder {
    engine: Engine,
    roots: Vec<PathBuf>,
    steps: Vec<Step>,
    debug: bool,
    split_trainingset: bool,
    ram_ratio_mb: u64,
    disk_factor: u64,
    console: bool,
    probe: Box<dyn SystemProbe>,
}

impl EngineBuilder {
    /// `steps` limits training to the named steps; `None` runs them all.
    pub fn new<S: AsRef<str>>(
        engine: Engine,
        roots: Vec<PathBuf>,
        steps: Option<&[S]>,
    ) -> Result<Self> {
        let steps = match steps {
            Some(names) => Step::parse_selection(names)?,
            None => Step::selectable_steps().collect(),
        };
        Ok(Self {
            engine,
            roots,
            steps,
            debug: false,
            split_trainingset: true,
            ram_ratio_mb: DEFAULT_RAM_RATIO_MB,
            disk_factor: DEFAULT_DISK_FACTOR,
            console: true,
            probe: Box::new(HostProbe),
        })
    }

    /// Take resource limits and the dev/test split flag from the settings.
    pub fn with_settings(mut self, settings: &TrainSettings) -> Self {
        self.ram_ratio_mb = settings.ram_ratio_mb;
        self.disk_factor = settings.disk_factor;
        self.split_trainingset = settings.split_trainingset;
        self
    }

    /// Keep the workspace after a successful build.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn split_trainingset(mut self, split: bool) -> Self {
        self.split_trainingset = split;
        self
    }

    pub fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    pub fn probe(mut self, probe: Box<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn build(&self) -> Result<()> {
        self.run(BuildMode::Fresh)
    }

    /// Continue an interrupted attempt, skipping the steps it completed.
    pub fn resume(&self) -> Result<()> {
        self.run(BuildMode::Resume)
    }

    pub fn run(&self, mode: BuildMode) -> Result<()> {
        let (bilingual, monolingual) = self.resolve_corpora()?;
        if bilingual.is_empty() {
            return Err(TrainError::no_training_data(
                self.engine.source_lang(),
                self.engine.target_lang(),
            ));
        }

        let mut attempt = self.start(mode)?;
        self.preflight(&attempt.logger);

        match self.train(&mut attempt, bilingual, monolingual) {
            Ok(()) => attempt.logger.close(),
            Err(err) => {
                attempt.logger.error(&err);
                if let Err(close_err) = attempt.logger.close() {
                    tracing::warn!("closing training log failed: {close_err}");
                }
                Err(err)
            }
        }
    }

    /// Allocate the workspace and checkpoint, prepare the engine directory and open
    /// the attempt log.
    pub fn start(&self, mode: BuildMode) -> Result<Attempt> {
        let resume = mode == BuildMode::Resume;

        let root = self.engine.temp_dir(WORKSPACE_NAME, false)?;
        let workspace = Workspace::open(&root, !resume)?;
        let checkpoint_path = workspace.file(CHECKPOINT_FILENAME);
        let checkpoint = if resume {
            CheckpointStore::load_from_file(&checkpoint_path)?
        } else {
            CheckpointStore::create_for_attempt(&checkpoint_path)?
        };

        let engine_missing = !self.engine.path().is_dir();
        if !resume || engine_missing {
            self.engine.reset_dirs()?;
        }

        let log_path = self.engine.log_file("training")?;
        let logger = BuildLogger::open(
            &log_path,
            self.steps.len() + 1,
            ConsoleProgress::new(self.console),
        )?;
        if resume {
            logger.info(format!(
                "Resuming attempt, completed steps: {:?}",
                checkpoint.completed()
            ));
            if engine_missing && !checkpoint.completed().is_empty() {
                logger.warn(format!(
                    "engine directory {} was missing and has been recreated, models of the \
                     completed steps {:?} will not be rebuilt",
                    self.engine.path().display(),
                    checkpoint.completed()
                ));
            }
        }

        Ok(Attempt {
            workspace,
            checkpoint,
            logger,
        })
    }

    fn resolve_corpora(&self) -> Result<(Vec<Corpus>, Vec<Corpus>)> {
        let mut all = Vec::new();
        for root in &self.roots {
            let found =
                corpus::list(root).map_err(|e| TrainError::storage("list corpora", root, e))?;
            all.extend(found);
        }
        let (bilingual, monolingual) =
            corpus::split(all, self.engine.source_lang(), self.engine.target_lang());

        let mut training = bilingual.clone();
        training.extend(monolingual.iter().cloned());
        if let Some(name) = corpus::duplicate_name(&training) {
            return Err(TrainError::InvalidArgument(format!(
                "corpus '{name}' is found in more than one root, rename one of them"
            )));
        }
        Ok((bilingual, monolingual))
    }

    fn preflight(&self, logger: &BuildLogger) {
        let report = ResourceReport::measure(
            &self.roots,
            self.engine.path(),
            self.ram_ratio_mb,
            self.disk_factor,
            self.probe.as_ref(),
        );
        logger.debug(format!("Corpora size on disk: {} bytes", report.corpus_size));
        for warning in report.warnings() {
            logger.warn(warning);
        }
    }

    fn train(
        &self,
        attempt: &mut Attempt,
        bilingual: Vec<Corpus>,
        monolingual: Vec<Corpus>,
    ) -> Result<()> {
        let Attempt {
            workspace,
            checkpoint,
            logger,
        } = attempt;
        logger.start(&self.engine, bilingual.len(), monolingual.len());

        let ctx = StepContext {
            engine: &self.engine,
            workspace: &*workspace,
            split_trainingset: self.split_trainingset,
        };
        let mut runner = StepRunner::new(&self.steps, &mut *checkpoint, &mut *logger);

        let cleaned = runner.run(Step::TmCleanup, bilingual, false, true, |c, mode, log| {
            steps::tm_cleanup(&ctx, c, mode, log)
        })?;
        let (base_bi, base_mono) =
            runner.run(Step::DomainMap, (cleaned, monolingual), true, false, |c, mode, _| {
                steps::domain_map(&ctx, c, mode)
            })?;
        let (processed_bi, processed_mono, cleaned_bi) = runner.run(
            Step::Preprocess,
            (base_bi.clone(), base_mono, base_bi.clone()),
            false,
            true,
            |c, mode, log| steps::preprocess(&ctx, c, mode, log),
        )?;
        runner.run(Step::ContextAnalyzer, base_bi, false, true, |c, mode, log| {
            steps::context_analyzer(&ctx, &c, mode, log).map(|()| c)
        })?;
        let cleaned_bi = runner.run(Step::Aligner, cleaned_bi, false, true, |c, mode, log| {
            steps::aligner(&ctx, &c, mode, log).map(|()| c)
        })?;
        runner.run(Step::Tm, cleaned_bi, false, true, |c, mode, log| {
            steps::tm(&ctx, &c, mode, log).map(|()| c)
        })?;
        let mut lm_corpora = processed_bi;
        lm_corpora.extend(processed_mono);
        runner.run(Step::Lm, lm_corpora, false, true, |c, mode, log| {
            steps::lm(&ctx, &c, mode, log).map(|()| c)
        })?;

        let sink = logger.sink();
        logger.step(CONFIG_STEP_DESCRIPTION, || self.engine.write_configs(&sink))?;
        logger.completed();

        if !self.debug {
            workspace.teardown(None)?;
        }
        Ok(())
    }

    /// Root of the attempt workspace, whether or not it exists.
    pub fn workspace_path(&self) -> Result<PathBuf> {
        self.engine.temp_dir(WORKSPACE_NAME, false)
    }
}
