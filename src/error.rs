use std::path::Path;

use thiserror::Error;

/// Errors surfaced by the training pipeline.
///
/// Everything except `Collaborator` is raised by the orchestration core itself.
/// Collaborator failures are carried through untouched so the operator sees the
/// original cause chain.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("your project does not include {source_lang}-{target_lang} data")]
    NoTrainingData {
        source_lang: String,
        target_lang: String,
    },

    #[error("engine creation can not be resumed: {0}")]
    ResumeState(String),

    #[error("{context}: {path}")]
    Storage {
        context: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrainError>;

impl TrainError {
    pub fn storage(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Storage {
            context,
            path: path.display().to_string(),
            source,
        }
    }

    pub fn no_training_data(source_lang: &str, target_lang: &str) -> Self {
        Self::NoTrainingData {
            source_lang: source_lang.to_uppercase(),
            target_lang: target_lang.to_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TrainError;

    #[test]
    fn collaborator_errors_keep_their_message() {
        let err: TrainError = anyhow::anyhow!("fast_align exited with status 3").into();
        assert_eq!(err.to_string(), "fast_align exited with status 3");
    }

    #[test]
    fn no_training_data_uppercases_languages() {
        let err = TrainError::no_training_data("en", "it");
        assert_eq!(err.to_string(), "your project does not include EN-IT data");
    }
}
