use serde::{Deserialize, Serialize};

use crate::request::GenerationParams;
use crate::task::TaskId;

/* --------- servicio asíncrono (polling) --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
    pub estimated_time: String,
}

impl SubmitResponse {
    pub fn accepted(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: "accepted".to_string(),
            message: "Music generation started".to_string(),
            estimated_time: "2-5 minutes depending on length and hardware".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub gpu_available: bool,
    pub gpu_info: Option<String>,
    pub active_generations: usize,
    pub queued_generations: usize,
}

/// Cuerpo de todas las respuestas de error HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/* --------- handler de arranque en frío --------- */

/// Evento que recibe el handler: los parámetros van bajo `input`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColdStartEvent {
    #[serde(default)]
    pub input: GenerationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdStartSuccess {
    pub success: bool,
    pub audio_base64: String,
    pub file_size: u64,
    /// Segundos que tardó el generador
    pub generation_time: f64,
    pub audio_length: u32,
    pub model_used: String,
    pub prompt: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdStartFailure {
    pub success: bool,
    pub error: String,
}

/// Respuesta única del handler; nunca es un fallo sin estructura.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColdStartResponse {
    Success(ColdStartSuccess),
    Failure(ColdStartFailure),
}

impl ColdStartResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(ColdStartFailure {
            success: false,
            error: error.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
