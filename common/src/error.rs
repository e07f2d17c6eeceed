use std::path::PathBuf;

use thiserror::Error;

use crate::task::{TaskId, TaskStatus};

/// Errores de validación: culpa del cliente, se rechazan antes de reservar
/// cualquier recurso (no se crea tarea ni se tocan directorios).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingField(&'static str),

    #[error("audio_length must be 95 or 285 seconds (got {0})")]
    UnsupportedAudioLength(u32),

    #[error("batch_infer_num must be at least 1 (got {0})")]
    InvalidBatchCount(u32),

    #[error("File must be an LRC file")]
    NotAnLrcFile,

    #[error("LRC content must be valid UTF-8 text")]
    NonUtf8Lyrics,

    #[error("invalid value for {field}: {reason}")]
    Malformed { field: String, reason: String },
}

/// Fallos de una invocación del generador externo.
/// Todos son fatales para la tarea: no se reintenta.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Generation process failed: {detail}")]
    Process { code: Option<i32>, detail: String },

    #[error("No output file found after generation in {}", dir.display())]
    NoOutputProduced { dir: PathBuf },

    #[error("could not start generator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    /// Nombre corto de la clase de error, útil en logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Process { .. } => "process_error",
            Self::NoOutputProduced { .. } => "no_output",
            Self::Spawn { .. } => "spawn",
            Self::Io(_) => "io",
        }
    }
}

/// Errores del ciclo de vida de tareas tal como los ven las fachadas.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task {id} is {status}, expected {expected}")]
    InvalidState {
        id: TaskId,
        status: TaskStatus,
        expected: TaskStatus,
    },

    #[error("Generated file not found on disk: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type JobResult<T> = Result<T, JobError>;
