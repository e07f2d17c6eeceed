use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{AudioLength, GenerationRequest};

pub type TaskId = String;

pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado de la tarea junto con los datos que sólo existen en ese estado:
/// el artefacto sólo en `completed`, el error sólo en `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Processing,
    Completed {
        /// Ruta relativa al directorio base del servicio
        output_file: PathBuf,
        file_size: u64,
    },
    Failed {
        error: String,
    },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Queued => TaskStatus::Queued,
            Self::Processing => TaskStatus::Processing,
            Self::Completed { .. } => TaskStatus::Completed,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub state: TaskState,
    pub progress: u8,
    pub message: String,

    pub ref_prompt: String,
    pub audio_length: AudioLength,
    pub model_id: String,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn queued(task_id: TaskId, req: &GenerationRequest) -> Self {
        Self {
            task_id,
            state: TaskState::Queued,
            progress: 0,
            message: "Task queued for processing".to_string(),
            ref_prompt: req.ref_prompt().to_string(),
            audio_length: req.audio_length(),
            model_id: req.model_id().to_string(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn artifact(&self) -> Option<(&Path, u64)> {
        match &self.state {
            TaskState::Completed {
                output_file,
                file_size,
            } => Some((output_file.as_path(), *file_size)),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /* --------- transiciones; devuelven false si no aplican --------- */

    #[must_use]
    pub fn start(&mut self, progress: u8, message: &str) -> bool {
        if self.state != TaskState::Queued {
            return false;
        }
        self.state = TaskState::Processing;
        self.started_at = Some(Utc::now());
        self.progress = progress.min(99);
        self.message = message.to_string();
        true
    }

    /// El progreso nunca retrocede mientras la tarea está en proceso.
    #[must_use]
    pub fn advance(&mut self, progress: u8, message: &str) -> bool {
        if self.state != TaskState::Processing {
            return false;
        }
        self.progress = self.progress.max(progress.min(99));
        self.message = message.to_string();
        true
    }

    #[must_use]
    pub fn complete(&mut self, output_file: PathBuf, file_size: u64) -> bool {
        if self.state != TaskState::Processing {
            return false;
        }
        self.state = TaskState::Completed {
            output_file,
            file_size,
        };
        self.progress = 100;
        self.message = "Generation completed successfully".to_string();
        self.finished_at = Some(Utc::now());
        true
    }

    #[must_use]
    pub fn fail(&mut self, error: String) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        self.message = format!("Generation failed: {error}");
        self.state = TaskState::Failed { error };
        self.progress = 0;
        self.finished_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GenerationParams;

    fn record() -> TaskRecord {
        let req = GenerationParams {
            lrc_content: Some("[00:01.00]la".to_string()),
            ref_prompt: Some("jazz".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        TaskRecord::queued(new_task_id(), &req)
    }

    #[test]
    fn ciclo_completo_hasta_completed() {
        let mut r = record();
        assert_eq!(r.status(), TaskStatus::Queued);

        assert!(r.start(10, "Initializing model..."));
        assert!(r.advance(30, "Generating music..."));
        assert!(r.complete(PathBuf::from("output/x/a.wav"), 42));

        assert_eq!(r.status(), TaskStatus::Completed);
        assert_eq!(r.progress, 100);
        assert_eq!(r.artifact(), Some((Path::new("output/x/a.wav"), 42)));
        assert!(r.error().is_none());
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn el_progreso_no_retrocede() {
        let mut r = record();
        assert!(r.start(10, "a"));
        assert!(r.advance(30, "b"));
        assert!(r.advance(20, "c"));

        assert_eq!(r.progress, 30);
        assert_eq!(r.message, "c");
    }

    #[test]
    fn fallo_deja_progreso_en_cero_y_sin_artefacto() {
        let mut r = record();
        assert!(r.start(10, "a"));
        assert!(r.fail("Generation timed out after 600 seconds".to_string()));

        assert_eq!(r.status(), TaskStatus::Failed);
        assert_eq!(r.progress, 0);
        assert!(r.artifact().is_none());
        assert_eq!(r.error(), Some("Generation timed out after 600 seconds"));
    }

    #[test]
    fn los_estados_terminales_no_cambian() {
        let mut r = record();
        assert!(r.start(10, "a"));
        assert!(r.fail("boom".to_string()));

        assert!(!r.complete(PathBuf::from("a.wav"), 1));
        assert!(!r.advance(50, "x"));
        assert!(!r.fail("otra vez".to_string()));
        assert_eq!(r.error(), Some("boom"));

        let mut ok = record();
        assert!(ok.start(10, "a"));
        assert!(ok.complete(PathBuf::from("a.wav"), 1));
        assert!(!ok.fail("tarde".to_string()));
        assert_eq!(ok.status(), TaskStatus::Completed);
    }

    #[test]
    fn no_se_completa_sin_haber_empezado() {
        let mut r = record();
        assert!(!r.complete(PathBuf::from("a.wav"), 1));
        assert_eq!(r.status(), TaskStatus::Queued);
    }

    #[test]
    fn serializa_estado_plano_en_el_registro() {
        let mut r = record();
        assert!(r.start(10, "a"));
        assert!(r.complete(PathBuf::from("output/t/a.wav"), 7));

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "completed");
        assert_eq!(v["output_file"], "output/t/a.wav");
        assert_eq!(v["file_size"], 7);
        assert_eq!(v["progress"], 100);
        assert!(v.get("error").is_none());

        let back: TaskRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
