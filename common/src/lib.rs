pub mod api;
pub mod config;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod models;
pub mod request;
pub mod store;
pub mod task;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use api::{
    CleanupResponse, ColdStartEvent, ColdStartFailure, ColdStartResponse, ColdStartSuccess,
    ErrorBody, HealthResponse, ServiceInfo, SubmitResponse,
};
pub use config::{GeneratorConfig, ServiceConfig, StorageLayout};
pub use error::{GenerationError, JobError, JobResult, ValidationError};
pub use generator::{GeneratedArtifact, Generator, GeneratorCommand};
pub use lifecycle::{generate_inline, ArtifactLocation, InlineArtifact, JobManager};
pub use models::{catalog, ModelCatalog, ModelInfo, DEFAULT_MODEL_ID};
pub use request::{AudioLength, GenerationParams, GenerationRequest};
pub use store::TaskStore;
pub use task::{TaskId, TaskRecord, TaskState, TaskStatus};
