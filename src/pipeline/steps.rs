//! The fixed training step chain and what each step does.
//!
//! Every step function is called in one of two modes. `Execute` does the work;
//! `Skip` rebuilds the step's output from what a previous attempt left on disk.

use std::path::Path;

use crate::corpus::{self, Corpus};
use crate::engine::Engine;
use crate::error::{Result, TrainError};

use super::logger::LogSink;
use super::workspace::Workspace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    TmCleanup,
    DomainMap,
    Preprocess,
    ContextAnalyzer,
    Aligner,
    Tm,
    Lm,
}

impl Step {
    /// Pipeline order.
    pub const ALL: [Step; 7] = [
        Step::TmCleanup,
        Step::DomainMap,
        Step::Preprocess,
        Step::ContextAnalyzer,
        Step::Aligner,
        Step::Tm,
        Step::Lm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::TmCleanup => "tm_cleanup",
            Step::DomainMap => "__db_map",
            Step::Preprocess => "preprocess",
            Step::ContextAnalyzer => "context_analyzer",
            Step::Aligner => "aligner",
            Step::Tm => "tm",
            Step::Lm => "lm",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Step::TmCleanup => "TMs clean-up",
            Step::DomainMap => "Domain mapping",
            Step::Preprocess => "Corpora pre-processing",
            Step::ContextAnalyzer => "Context Analyzer training",
            Step::Aligner => "Aligner training",
            Step::Tm => "Translation Model training",
            Step::Lm => "Language Model training",
        }
    }

    /// Whether an operator may ask for this step; the rest always run.
    pub fn selectable(self) -> bool {
        self != Step::DomainMap
    }

    pub fn from_name(name: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn selectable_steps() -> impl Iterator<Item = Step> {
        Step::ALL.into_iter().filter(|s| s.selectable())
    }

    /// Resolve an operator's step list. Unknown (or non-selectable) names are
    /// reported together.
    pub fn parse_selection<S: AsRef<str>>(names: &[S]) -> Result<Vec<Step>> {
        let mut steps = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match Step::from_name(name).filter(|s| s.selectable()) {
                Some(step) => {
                    if !steps.contains(&step) {
                        steps.push(step);
                    }
                }
                None => unknown.push(name.to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(TrainError::InvalidArgument(format!(
                "Unknown training steps: {unknown:?}"
            )));
        }
        Ok(steps)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMode {
    Execute,
    Skip,
}

/// What the step functions work with.
pub struct StepContext<'a> {
    pub engine: &'a Engine,
    pub workspace: &'a Workspace,
    pub split_trainingset: bool,
}

/// Output of `preprocess`: (processed bilingual, processed monolingual, cleaned bilingual).
pub type Preprocessed = (Vec<Corpus>, Vec<Corpus>, Vec<Corpus>);

fn list_dir(dir: &Path) -> Result<Vec<Corpus>> {
    corpus::list(dir).map_err(|e| TrainError::storage("list corpora", dir, e))
}

fn split_dir(dir: &Path, engine: &Engine) -> Result<(Vec<Corpus>, Vec<Corpus>)> {
    Ok(corpus::split(list_dir(dir)?, engine.source_lang(), engine.target_lang()))
}

pub fn tm_cleanup(
    ctx: &StepContext<'_>,
    corpora: Vec<Corpus>,
    mode: StepMode,
    log: &LogSink,
) -> Result<Vec<Corpus>> {
    let folder = ctx.workspace.subdir("clean_tms", false)?;
    match mode {
        StepMode::Skip => list_dir(&folder),
        StepMode::Execute => Ok(ctx.engine.collaborators().cleaner.clean(&corpora, &folder, log)?),
    }
}

pub fn domain_map(
    ctx: &StepContext<'_>,
    (bilingual, monolingual): (Vec<Corpus>, Vec<Corpus>),
    mode: StepMode,
) -> Result<(Vec<Corpus>, Vec<Corpus>)> {
    let folder = ctx
        .workspace
        .subdir("training_corpora", mode == StepMode::Execute)?;
    if mode == StepMode::Execute {
        ctx.engine.domains().generate(&bilingual, &monolingual, &folder)?;
    }
    // Read back in both modes so a resumed attempt sees the same corpus order.
    split_dir(&folder, ctx.engine)
}

pub fn preprocess(
    ctx: &StepContext<'_>,
    (bilingual, monolingual, _): Preprocessed,
    mode: StepMode,
    log: &LogSink,
) -> Result<Preprocessed> {
    let preprocessed = ctx.workspace.subdir("preprocessed", false)?;
    let cleaned = ctx.workspace.subdir("clean_corpora", false)?;

    match mode {
        StepMode::Skip => {
            let (bi, mono) = split_dir(&preprocessed, ctx.engine)?;
            Ok((bi, mono, list_dir(&cleaned)?))
        }
        StepMode::Execute => {
            let preprocessor = &ctx.engine.collaborators().preprocessor;
            let data_dir = ctx.split_trainingset.then(|| ctx.engine.data_path());
            let mut inputs = bilingual;
            inputs.extend(monolingual);

            let (bi, mono) = preprocessor.process(&inputs, &preprocessed, data_dir, log)?;
            let clean = preprocessor.clean(&bi, &cleaned, log)?;
            Ok((bi, mono, clean))
        }
    }
}

pub fn context_analyzer(
    ctx: &StepContext<'_>,
    corpora: &[Corpus],
    mode: StepMode,
    log: &LogSink,
) -> Result<()> {
    if mode == StepMode::Execute {
        let work_dir = ctx.workspace.subdir("context_analyzer", true)?;
        ctx.engine
            .collaborators()
            .context_analyzer
            .create_index(corpora, &work_dir, log)?;
    }
    Ok(())
}

pub fn aligner(
    ctx: &StepContext<'_>,
    corpora: &[Corpus],
    mode: StepMode,
    log: &LogSink,
) -> Result<()> {
    if mode == StepMode::Execute {
        let work_dir = ctx.workspace.subdir("aligner", true)?;
        ctx.engine.collaborators().aligner.build(corpora, &work_dir, log)?;
    }
    Ok(())
}

pub fn tm(ctx: &StepContext<'_>, corpora: &[Corpus], mode: StepMode, log: &LogSink) -> Result<()> {
    if mode == StepMode::Execute {
        let work_dir = ctx.workspace.subdir("tm", true)?;
        let collab = ctx.engine.collaborators();
        collab
            .phrase_table
            .train(corpora, collab.aligner.as_ref(), &work_dir, log)?;
    }
    Ok(())
}

pub fn lm(ctx: &StepContext<'_>, corpora: &[Corpus], mode: StepMode, log: &LogSink) -> Result<()> {
    if mode == StepMode::Execute {
        let work_dir = ctx.workspace.subdir("lm", true)?;
        ctx.engine.collaborators().language_model.train(
            corpora,
            ctx.engine.target_lang(),
            &work_dir,
            log,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_lookup() {
        for step in Step::ALL {
            assert_eq!(Step::from_name(step.name()), Some(step));
        }
        assert_eq!(Step::from_name("decoder"), None);
    }

    #[test]
    fn domain_map_is_the_only_hidden_step() {
        let hidden: Vec<Step> = Step::ALL.into_iter().filter(|s| !s.selectable()).collect();
        assert_eq!(hidden, [Step::DomainMap]);
        assert_eq!(Step::selectable_steps().count(), 6);
    }

    #[test]
    fn selection_reports_every_unknown_name() {
        let err = Step::parse_selection(&["aligner", "bogus", "__db_map", "lm"])
            .err()
            .expect("must fail");
        match err {
            TrainError::InvalidArgument(msg) => {
                assert!(msg.contains("bogus"));
                assert!(msg.contains("__db_map"));
                assert!(!msg.contains("aligner"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn selection_drops_duplicates() {
        let steps = Step::parse_selection(&["lm", "tm", "lm"]).expect("parse");
        assert_eq!(steps, [Step::Lm, Step::Tm]);
    }
}
