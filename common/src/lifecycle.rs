//! Ciclo de vida de las tareas de generación.
//!
//! `JobManager` es el único que muta los registros del `TaskStore`:
//! `submit` crea la tarea en `queued` y la entrega al pool; cada ejecución
//! espera un permiso del semáforo (un hueco del acelerador) y recorre
//! `queued -> processing -> completed | failed`.
//!
//! `generate_inline` usa la misma ejecución pero sin registro, dentro de un
//! directorio temporal que se borra al volver.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{ServiceConfig, StorageLayout};
use crate::error::{GenerationError, JobError, JobResult};
use crate::generator::{GeneratedArtifact, Generator};
use crate::request::GenerationRequest;
use crate::store::TaskStore;
use crate::task::{new_task_id, TaskId, TaskRecord, TaskStatus};

const PROGRESS_STARTED: u8 = 10;
const PROGRESS_LAUNCHED: u8 = 30;

/// Dónde vive el artefacto de una tarea completada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub path: PathBuf,
    pub file_size: u64,
}

/// Audio generado por la vía síncrona, ya leído a memoria.
#[derive(Debug, Clone)]
pub struct InlineArtifact {
    pub bytes: Vec<u8>,
    pub file_size: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct JobManager {
    store: TaskStore,
    generator: Generator,
    layout: StorageLayout,
    permits: Arc<Semaphore>,
}

impl JobManager {
    pub fn new(layout: StorageLayout, generator: Generator, max_concurrent: usize) -> Self {
        Self {
            store: TaskStore::new(),
            generator,
            layout,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.storage.clone(),
            Generator::new(config.generator.clone()),
            config.max_concurrent_generations,
        )
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Acepta una petición ya validada: guarda las letras, crea el registro
    /// en `queued` y programa la ejecución. No espera al generador.
    pub async fn submit(&self, req: GenerationRequest, file_name: &str) -> JobResult<TaskId> {
        let mut id = new_task_id();
        while !self.store.insert(TaskRecord::queued(id.clone(), &req)) {
            id = new_task_id();
        }

        let lrc_path = self.layout.upload_path(&id, file_name);
        let saved = async {
            tokio::fs::create_dir_all(self.layout.temp_dir()).await?;
            tokio::fs::write(&lrc_path, req.lrc_content()).await
        }
        .await;
        if let Err(e) = saved {
            self.store.remove(&id);
            error!("no se pudo guardar el LRC de la tarea {}: {}", id, e);
            return Err(e.into());
        }

        info!(
            "tarea {} aceptada (prompt={:?}, length={}s, model={}, batch={})",
            id,
            req.ref_prompt(),
            req.audio_length(),
            req.model_id(),
            req.batch_infer_num()
        );

        let manager = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            manager.run_queued(task_id, req, lrc_path).await;
        });

        Ok(id)
    }

    /// Espera un hueco del pool y ejecuta. Mientras espera, la tarea sigue
    /// en `queued`.
    async fn run_queued(self, id: TaskId, req: GenerationRequest, lrc_path: PathBuf) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                let _ = self
                    .store
                    .update(&id, |r| r.fail("generation pool is shut down".to_string()));
                remove_temp_file(&lrc_path).await;
                return;
            }
        };

        self.execute(&id, &req, &lrc_path).await;
    }

    /// Ejecuta una tarea de principio a fin. Los errores de ejecución quedan
    /// en el registro como `failed`; nunca se propagan.
    pub async fn execute(&self, id: &TaskId, req: &GenerationRequest, lrc_path: &Path) {
        let started = self
            .store
            .update(id, |r| r.start(PROGRESS_STARTED, "Initializing model..."));
        if started != Some(true) {
            // se limpió mientras esperaba en la cola
            warn!("tarea {} ya no está en cola, no se ejecuta", id);
            remove_temp_file(lrc_path).await;
            return;
        }

        let output_dir = self.layout.task_output_dir(id);
        let outcome = self.generate_into(id, req, lrc_path, &output_dir).await;

        let recorded = match outcome {
            Ok(artifact) => {
                let relative = artifact
                    .path
                    .strip_prefix(self.layout.base_dir())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| artifact.path.clone());
                info!(
                    "tarea {} completada: {} ({} bytes, {:.2}s)",
                    id,
                    relative.display(),
                    artifact.file_size,
                    artifact.elapsed.as_secs_f64()
                );
                self.store
                    .update(id, |r| r.complete(relative, artifact.file_size))
            }
            Err(e) => {
                error!("tarea {} falló ({}): {}", id, e.kind(), e);
                self.store.update(id, |r| r.fail(e.to_string()))
            }
        };

        if recorded.is_none() {
            // limpiada durante la ejecución: no dejar salida huérfana
            warn!("tarea {} se eliminó durante la generación", id);
            remove_dir(&output_dir).await;
        }

        remove_temp_file(lrc_path).await;
    }

    async fn generate_into(
        &self,
        id: &TaskId,
        req: &GenerationRequest,
        lrc_path: &Path,
        output_dir: &Path,
    ) -> Result<GeneratedArtifact, GenerationError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let _ = self
            .store
            .update(id, |r| r.advance(PROGRESS_LAUNCHED, "Generating music..."));
        self.generator.generate(req, lrc_path, output_dir).await
    }

    pub fn status(&self, id: &str) -> JobResult<TaskRecord> {
        self.store
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Resuelve el artefacto de una tarea `completed` y comprueba que siga
    /// en disco.
    pub async fn artifact(&self, id: &str) -> JobResult<ArtifactLocation> {
        let record = self.status(id)?;
        let Some((relative, file_size)) = record.artifact() else {
            return Err(JobError::InvalidState {
                id: record.task_id.clone(),
                status: record.status(),
                expected: TaskStatus::Completed,
            });
        };

        let path = self.layout.base_dir().join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(ArtifactLocation { path, file_size }),
            _ => Err(JobError::ArtifactMissing { path }),
        }
    }

    /// Borra el directorio de salida y el registro. Una segunda llamada con
    /// el mismo id devuelve `NotFound`.
    pub async fn cleanup(&self, id: &str) -> JobResult<()> {
        if self.store.get(id).is_none() {
            return Err(JobError::NotFound(id.to_string()));
        }

        let output_dir = self.layout.task_output_dir(id);
        match tokio::fs::remove_dir_all(&output_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.store
            .remove(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        info!("tarea {} limpiada", id);
        Ok(())
    }

    pub fn active_generations(&self) -> usize {
        self.store.count_by_status(TaskStatus::Processing)
    }

    pub fn queued_generations(&self) -> usize {
        self.store.count_by_status(TaskStatus::Queued)
    }

    pub fn task_count(&self) -> usize {
        self.store.len()
    }
}

/// Vía síncrona: ejecuta una petición hasta el final dentro de un directorio
/// temporal propio y devuelve el audio en memoria. El directorio se borra al
/// salir, con éxito o con error.
pub async fn generate_inline(
    generator: &Generator,
    req: &GenerationRequest,
) -> JobResult<InlineArtifact> {
    let workspace = tempfile::Builder::new().prefix("generation-").tempdir()?;
    let lrc_path = workspace.path().join("input.lrc");
    let output_dir = workspace.path().join("output");

    tokio::fs::create_dir_all(&output_dir).await?;
    tokio::fs::write(&lrc_path, req.lrc_content()).await?;
    info!("LRC guardado en {}", lrc_path.display());

    let artifact = generator.generate(req, &lrc_path, &output_dir).await?;
    let bytes = tokio::fs::read(&artifact.path).await?;

    Ok(InlineArtifact {
        bytes,
        file_size: artifact.file_size,
        elapsed: artifact.elapsed,
    })
}

/// Borrado best-effort: un fallo aquí se registra y no cambia el resultado
/// de la tarea.
async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("no se pudo borrar el temporal {}: {}", path.display(), e),
    }
}

async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("no se pudo borrar {}: {}", path.display(), e),
    }
}
