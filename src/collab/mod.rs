//! Contracts of the external training components.
//!
//! The pipeline only knows these traits. `command` provides implementations that run a
//! configured external program for each stage.

mod command;

use std::path::Path;

use crate::corpus::Corpus;
use crate::pipeline::LogSink;

pub use command::{render_args, ExternalPreprocessor, ExternalTool, TemplateVars};

pub trait Cleaner {
    /// Clean `corpora` into `out_dir`, returning the cleaned corpora.
    fn clean(&self, corpora: &[Corpus], out_dir: &Path, log: &LogSink)
        -> anyhow::Result<Vec<Corpus>>;
}

pub trait Preprocessor {
    /// Tokenize/process `corpora` into `out_dir`; returns (bilingual, monolingual).
    ///
    /// With `data_dir` set, dev and test sets are extracted there as well.
    fn process(
        &self,
        corpora: &[Corpus],
        out_dir: &Path,
        data_dir: Option<&Path>,
        log: &LogSink,
    ) -> anyhow::Result<(Vec<Corpus>, Vec<Corpus>)>;

    /// Produce the aligner-ready bilingual set from processed corpora.
    fn clean(&self, corpora: &[Corpus], out_dir: &Path, log: &LogSink)
        -> anyhow::Result<Vec<Corpus>>;
}

pub trait ContextAnalyzer {
    fn create_index(&self, corpora: &[Corpus], work_dir: &Path, log: &LogSink)
        -> anyhow::Result<()>;
}

pub trait Aligner {
    /// Where the trained alignment model is stored.
    fn model_path(&self) -> &Path;

    fn build(&self, corpora: &[Corpus], work_dir: &Path, log: &LogSink) -> anyhow::Result<()>;
}

pub trait PhraseTable {
    fn train(
        &self,
        corpora: &[Corpus],
        aligner: &dyn Aligner,
        work_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<()>;
}

pub trait LanguageModel {
    fn train(
        &self,
        corpora: &[Corpus],
        target_lang: &str,
        work_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<()>;
}

pub trait DecoderConfig {
    /// Write the decoder's configuration next to the trained models.
    fn create_configs(&self, log: &LogSink) -> anyhow::Result<()>;
}

/// The full set of components an engine is trained with.
pub struct Collaborators {
    pub cleaner: Box<dyn Cleaner>,
    pub preprocessor: Box<dyn Preprocessor>,
    pub context_analyzer: Box<dyn ContextAnalyzer>,
    pub aligner: Box<dyn Aligner>,
    pub phrase_table: Box<dyn PhraseTable>,
    pub language_model: Box<dyn LanguageModel>,
    pub decoder_config: Box<dyn DecoderConfig>,
}
