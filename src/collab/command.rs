use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context};

use crate::config::CommandSpec;
use crate::corpus::{self, Corpus};
use crate::pipeline::LogSink;

use super::{
    Aligner, Cleaner, ContextAnalyzer, DecoderConfig, LanguageModel, PhraseTable, Preprocessor,
};

/// Values substituted into a command's argument templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateVars {
    pairs: Vec<(&'static str, String)>,
    inputs: Vec<PathBuf>,
    data: Option<PathBuf>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl AsRef<Path>) -> Self {
        let value = value.as_ref().display().to_string();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    pub fn inputs(mut self, inputs: Vec<PathBuf>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn data(mut self, data: Option<&Path>) -> Self {
        self.data = data.map(Path::to_path_buf);
        self
    }
}

fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

/// Expand argument templates.
///
/// `{{inputs}}` and `{{data}}` used as a whole argument expand to zero or more
/// arguments; anywhere else they are substituted as plain text.
pub fn render_args(templates: &[String], vars: &TemplateVars) -> Vec<String> {
    let joined_inputs = vars
        .inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let data = vars
        .data
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let mut pairs: Vec<(&str, &str)> =
        vars.pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    pairs.push(("inputs", joined_inputs.as_str()));
    pairs.push(("data", data.as_str()));

    let mut out = Vec::with_capacity(templates.len());
    for template in templates {
        match template.as_str() {
            "{{inputs}}" => out.extend(vars.inputs.iter().map(|p| p.display().to_string())),
            "{{data}}" => {
                if vars.data.is_some() {
                    out.push(data.clone());
                }
            }
            _ => out.push(render_template(template, &pairs)),
        }
    }
    out
}

/// One external program standing in for a training stage.
#[derive(Clone, Debug)]
pub struct ExternalTool {
    stage: &'static str,
    spec: Option<CommandSpec>,
    source_lang: String,
    target_lang: String,
    model: PathBuf,
}

impl ExternalTool {
    pub fn new(
        stage: &'static str,
        spec: Option<CommandSpec>,
        source_lang: &str,
        target_lang: &str,
        model: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stage,
            spec,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            model: model.into(),
        }
    }

    fn base_vars(&self) -> TemplateVars {
        TemplateVars::new()
            .set("source_lang", &self.source_lang)
            .set("target_lang", &self.target_lang)
            .set("model", &self.model)
    }

    fn run(&self, vars: &TemplateVars, log: &LogSink) -> anyhow::Result<()> {
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| anyhow!("no external tool configured for {}", self.stage))?;
        let args = render_args(&spec.args, vars);

        log.write_line(&format!("$ {} {}", spec.program, args.join(" ")))
            .context("write tool log")?;
        let status = Command::new(&spec.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(log.stdio().context("log sink for stdout")?)
            .stderr(log.stdio().context("log sink for stderr")?)
            .status()
            .with_context(|| format!("{}: spawn {}", self.stage, spec.program))?;

        if !status.success() {
            bail!("{}: {} exited with {}", self.stage, spec.program, status);
        }
        Ok(())
    }

    /// Run the tool over `corpora`, staged by symlink into a sibling of `out_dir`.
    fn run_over(
        &self,
        corpora: &[Corpus],
        out_dir: &Path,
        inputs: Vec<PathBuf>,
        extra: impl FnOnce(TemplateVars) -> TemplateVars,
        log: &LogSink,
    ) -> anyhow::Result<()> {
        let staging = stage_inputs(corpora, out_dir)?;
        let vars = extra(
            self.base_vars()
                .set("input", &staging)
                .set("output", out_dir)
                .inputs(inputs),
        );
        self.run(&vars, log)
    }
}

fn stage_inputs(corpora: &[Corpus], out_dir: &Path) -> anyhow::Result<PathBuf> {
    let mut name = out_dir
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".input");
    let staging = out_dir.with_file_name(name);

    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("clear staging dir: {}", staging.display()))?;
    }
    fs::create_dir_all(&staging)
        .with_context(|| format!("create staging dir: {}", staging.display()))?;
    for corpus in corpora {
        corpus
            .symlink(&staging, None)
            .with_context(|| format!("stage corpus {}", corpus.name()))?;
    }
    Ok(staging)
}

fn all_files(corpora: &[Corpus]) -> Vec<PathBuf> {
    corpora
        .iter()
        .flat_map(|c| c.langs().iter().map(move |l| c.path(l)))
        .collect()
}

fn list_output(out_dir: &Path) -> anyhow::Result<Vec<Corpus>> {
    corpus::list(out_dir).with_context(|| format!("list corpora: {}", out_dir.display()))
}

impl Cleaner for ExternalTool {
    fn clean(
        &self,
        corpora: &[Corpus],
        out_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<Vec<Corpus>> {
        self.run_over(corpora, out_dir, all_files(corpora), |v| v, log)?;
        list_output(out_dir)
    }
}

impl ContextAnalyzer for ExternalTool {
    fn create_index(
        &self,
        corpora: &[Corpus],
        work_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<()> {
        self.run_over(corpora, work_dir, all_files(corpora), |v| v, log)
    }
}

impl Aligner for ExternalTool {
    fn model_path(&self) -> &Path {
        &self.model
    }

    fn build(&self, corpora: &[Corpus], work_dir: &Path, log: &LogSink) -> anyhow::Result<()> {
        self.run_over(corpora, work_dir, all_files(corpora), |v| v, log)
    }
}

impl PhraseTable for ExternalTool {
    fn train(
        &self,
        corpora: &[Corpus],
        aligner: &dyn Aligner,
        work_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<()> {
        let aligner_model = aligner.model_path().to_path_buf();
        self.run_over(
            corpora,
            work_dir,
            all_files(corpora),
            |v| v.set("aligner_model", &aligner_model),
            log,
        )
    }
}

impl LanguageModel for ExternalTool {
    fn train(
        &self,
        corpora: &[Corpus],
        target_lang: &str,
        work_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<()> {
        let inputs = corpora
            .iter()
            .filter(|c| c.has_lang(target_lang))
            .map(|c| c.path(target_lang))
            .collect();
        self.run_over(
            corpora,
            work_dir,
            inputs,
            |v| v.set("target_lang", target_lang),
            log,
        )
    }
}

impl DecoderConfig for ExternalTool {
    /// Decoder configuration is optional: without a configured tool nothing is written.
    fn create_configs(&self, log: &LogSink) -> anyhow::Result<()> {
        if self.spec.is_none() {
            return Ok(());
        }
        self.run(&self.base_vars(), log)
    }
}

/// Preprocessing runs two tools: the processor proper and the second cleaning pass.
pub struct ExternalPreprocessor {
    pub process: ExternalTool,
    pub clean: ExternalTool,
}

impl Preprocessor for ExternalPreprocessor {
    fn process(
        &self,
        corpora: &[Corpus],
        out_dir: &Path,
        data_dir: Option<&Path>,
        log: &LogSink,
    ) -> anyhow::Result<(Vec<Corpus>, Vec<Corpus>)> {
        if let Some(dir) = data_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("create data dir: {}", dir.display()))?;
        }
        self.process
            .run_over(corpora, out_dir, all_files(corpora), |v| v.data(data_dir), log)?;
        let processed = list_output(out_dir)?;
        Ok(corpus::split(
            processed,
            &self.process.source_lang,
            &self.process.target_lang,
        ))
    }

    fn clean(
        &self,
        corpora: &[Corpus],
        out_dir: &Path,
        log: &LogSink,
    ) -> anyhow::Result<Vec<Corpus>> {
        Cleaner::clean(&self.clean, corpora, out_dir, log)
    }
}
