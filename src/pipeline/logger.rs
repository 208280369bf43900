use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::engine::Engine;
use crate::error::{Result, TrainError};
use crate::progress::{pretty_time, ConsoleProgress};

/// Raw output channel handed to collaborators (usually the attempt log file).
#[derive(Clone, Default)]
pub struct LogSink {
    file: Option<Arc<File>>,
}

impl LogSink {
    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self { file: None }
    }

    /// A `Stdio` for a child process writing into this sink.
    pub fn stdio(&self) -> io::Result<Stdio> {
        match &self.file {
            Some(file) => Ok(Stdio::from(file.try_clone()?)),
            None => Ok(Stdio::null()),
        }
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        match &self.file {
            Some(file) => writeln!(&**file, "{line}"),
            None => Ok(()),
        }
    }
}

/// Log of one training attempt: a leveled, timestamped file plus console progress.
///
/// Events go through a `Dispatch` owned by this value, never through a global
/// subscriber, so the log lives exactly as long as the attempt.
pub struct BuildLogger {
    path: PathBuf,
    file: Arc<File>,
    dispatch: Dispatch,
    console: ConsoleProgress,
    steps_count: usize,
    current_step: usize,
    engine_name: Option<String>,
    started: Instant,
}

impl BuildLogger {
    /// Truncate `path` and start logging into it.
    pub fn open(path: &Path, steps_count: usize, console: ConsoleProgress) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrainError::storage("create log dir", parent, e))?;
        }
        let file = Arc::new(
            File::create(path).map_err(|e| TrainError::storage("create log file", path, e))?,
        );

        let subscriber = tracing_subscriber::fmt()
            .with_writer(file.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(Level::DEBUG)
            .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
            .finish();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            dispatch: Dispatch::new(subscriber),
            console,
            steps_count,
            current_step: 0,
            engine_name: None,
            started: Instant::now(),
        })
    }

    pub fn sink(&self) -> LogSink {
        LogSink {
            file: Some(self.file.clone()),
        }
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.emit(Level::DEBUG, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(Level::INFO, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.emit(Level::WARN, msg.as_ref());
        self.console.warn(msg);
    }

    fn emit(&self, level: Level, msg: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            if level == Level::ERROR {
                tracing::error!("{msg}");
            } else if level == Level::WARN {
                tracing::warn!("{msg}");
            } else if level == Level::INFO {
                tracing::info!("{msg}");
            } else {
                tracing::debug!("{msg}");
            }
        });
    }

    pub fn start(&mut self, engine: &Engine, bilingual: usize, monolingual: usize) {
        self.started = Instant::now();
        self.engine_name =
            (engine.name() != Engine::DEFAULT_NAME).then(|| engine.name().to_string());

        self.info(format!(
            "Training started: engine={}, bilingual={}, monolingual={}, langpair={}-{}",
            engine.name(),
            bilingual,
            monolingual,
            engine.source_lang(),
            engine.target_lang()
        ));
        self.console.banner(
            "TRAINING STARTED",
            &[
                format!("ENGINE:  {}", engine.name()),
                format!("BILINGUAL CORPORA: {bilingual} documents"),
                format!("MONOLINGUAL CORPORA: {monolingual} documents"),
                format!("LANGS:   {} > {}", engine.source_lang(), engine.target_lang()),
            ],
        );
    }

    /// Run `f` as the next numbered step, logging start, end and elapsed time.
    pub fn step<T>(&mut self, description: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.current_step += 1;
        self.info(format!(
            "Training step \"{description}\" ({}/{}) started",
            self.current_step, self.steps_count
        ));
        self.console
            .step_begin(self.current_step, self.steps_count, description);

        let t0 = Instant::now();
        let result = f();
        let elapsed = t0.elapsed();

        self.console.step_end(elapsed, result.is_ok());
        match &result {
            Ok(_) => self.info(format!(
                "Training step \"{description}\" completed in {}",
                pretty_time(elapsed)
            )),
            Err(_) => self.info(format!(
                "Training step \"{description}\" failed after {}",
                pretty_time(elapsed)
            )),
        }
        result
    }

    pub fn completed(&self) {
        self.info(format!(
            "Training completed in {}",
            pretty_time(self.started.elapsed())
        ));
        let hint = match &self.engine_name {
            Some(name) => format!("\t./mmt start|stop|status -e {name}"),
            None => "\t./mmt start|stop|status".to_string(),
        };
        self.console.banner(
            "TRAINING SUCCESS",
            &[
                "You can now start, stop or check the status of the server with command:"
                    .to_string(),
                hint,
            ],
        );
    }

    /// Log an error that is about to end the attempt, with its whole cause chain.
    pub fn error(&self, err: &TrainError) {
        let mut msg = format!("Unexpected exception: {err}");
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            msg.push_str(&format!("\n    caused by: {cause}"));
            source = cause.source();
        }
        self.emit(Level::ERROR, &msg);
    }

    /// Flush and release the log file.
    pub fn close(self) -> Result<()> {
        let path = self.path.clone();
        drop(self.dispatch);
        self.file
            .sync_all()
            .map_err(|e| TrainError::storage("flush log file", &path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_are_leveled_and_land_in_the_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("logs").join("training.log");
        let mut logger = BuildLogger::open(&path, 2, ConsoleProgress::new(false)).expect("open");

        logger.info("hello");
        let value = logger.step("Aligner training", || Ok(7)).expect("step");
        assert_eq!(value, 7);
        logger.sink().write_line("raw tool output").expect("write");
        logger.close().expect("close");

        let text = std::fs::read_to_string(&path).expect("read log");
        assert!(text.contains("INFO"));
        assert!(text.contains("hello"));
        assert!(text.contains("Training step \"Aligner training\" (1/2) started"));
        assert!(text.contains("Training step \"Aligner training\" completed in 0s"));
        assert!(text.contains("raw tool output"));
    }

    #[test]
    fn error_includes_cause_chain() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("training.log");
        let logger = BuildLogger::open(&path, 1, ConsoleProgress::new(false)).expect("open");

        let err = TrainError::storage(
            "write checkpoint",
            Path::new("/x/checkpoint.json"),
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only fs"),
        );
        logger.error(&err);
        logger.close().expect("close");

        let text = std::fs::read_to_string(&path).expect("read log");
        assert!(text.contains("ERROR"));
        assert!(text.contains("Unexpected exception: write checkpoint: /x/checkpoint.json"));
        assert!(text.contains("caused by: read-only fs"));
    }

    #[test]
    fn open_truncates_previous_log() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("training.log");
        std::fs::write(&path, "stale attempt\n").expect("write");

        let logger = BuildLogger::open(&path, 1, ConsoleProgress::new(false)).expect("open");
        logger.info("fresh");
        logger.close().expect("close");

        let text = std::fs::read_to_string(&path).expect("read log");
        assert!(!text.contains("stale attempt"));
        assert!(text.contains("fresh"));
    }
}
