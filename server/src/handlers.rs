use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use common::{
    catalog, CleanupResponse, GenerationParams, GenerationRequest, HealthResponse, ModelCatalog,
    ServiceInfo, SubmitResponse, TaskRecord, ValidationError,
};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::probe::probe_accelerator;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/generate-music", post(generate_music))
        .route("/status/:task_id", get(get_status))
        .route("/download/:task_id", get(download))
        .route("/cleanup/:task_id", delete(cleanup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "DiffRhythm Music Generation API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

async fn list_models() -> Json<ModelCatalog> {
    Json(catalog())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let gpu = probe_accelerator().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        gpu_available: gpu.available,
        gpu_info: gpu.info,
        active_generations: state.manager.active_generations(),
        queued_generations: state.manager.queued_generations(),
    })
}

// Recibe el LRC + parámetros, crea la tarea y vuelve sin esperar al generador
async fn generate_music(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let form = SubmitForm::read(&mut multipart).await?;
    let (file_name, req) = form.validate()?;

    let task_id = state.manager.submit(req, &file_name).await?;
    info!("generación {} encolada desde {}", task_id, file_name);

    Ok(Json(SubmitResponse::accepted(task_id)))
}

async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    Ok(Json(state.manager.status(&task_id)?))
}

async fn download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let location = state.manager.artifact(&task_id).await?;

    let file = tokio::fs::File::open(&location.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound("Generated file not found on disk".to_string())
        } else {
            ApiError::Internal(format!("abriendo {}: {e}", location.path.display()))
        }
    })?;
    let len = file
        .metadata()
        .await
        .map(|m| m.len())
        .unwrap_or(location.file_size);

    let (ext, mime) = match location.path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => ("mp3", "audio/mpeg"),
        _ => ("wav", "audio/wav"),
    };

    let headers = [
        (header::CONTENT_TYPE, mime.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"generated_music_{task_id}.{ext}\""),
        ),
        (header::CONTENT_LENGTH, len.to_string()),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

async fn cleanup(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CleanupResponse>, ApiError> {
    state.manager.cleanup(&task_id).await?;
    Ok(Json(CleanupResponse {
        message: "Cleanup completed".to_string(),
    }))
}

/* ---------------- formulario de subida ---------------- */

#[derive(Debug, Default)]
struct SubmitForm {
    file_name: Option<String>,
    lrc_bytes: Option<Vec<u8>>,
    params: GenerationParams,
}

impl SubmitForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = SubmitForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "lrc_file" => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.lrc_bytes = Some(field.bytes().await?.to_vec());
                }
                "ref_prompt" => form.params.ref_prompt = Some(field.text().await?),
                "model_id" => form.params.model_id = Some(field.text().await?),
                "audio_length" => {
                    form.params.audio_length = Some(parse_number(&name, &field.text().await?)?)
                }
                "batch_infer_num" => {
                    form.params.batch_infer_num = Some(parse_number(&name, &field.text().await?)?)
                }
                "use_chunked" => {
                    form.params.use_chunked = Some(parse_bool(&name, &field.text().await?)?)
                }
                other => debug!("campo de formulario ignorado: {}", other),
            }
        }

        Ok(form)
    }

    /// Todo se valida antes de crear la tarea.
    fn validate(self) -> Result<(String, GenerationRequest), ValidationError> {
        let file_name = self
            .file_name
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingField("lrc_file"))?;
        if !file_name.ends_with(".lrc") {
            return Err(ValidationError::NotAnLrcFile);
        }

        let bytes = self
            .lrc_bytes
            .ok_or(ValidationError::MissingField("lrc_file"))?;
        let lrc = String::from_utf8(bytes).map_err(|_| ValidationError::NonUtf8Lyrics)?;

        let mut params = self.params;
        params.lrc_content = Some(lrc);
        Ok((file_name, params.validate()?))
    }
}

fn parse_number(field: &str, raw: &str) -> Result<u32, ValidationError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|e| ValidationError::Malformed {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ValidationError::Malformed {
            field: field.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use common::testutil::{fake_generator, WRITES_WAV};
    use common::{ErrorBody, Generator, JobManager, StorageLayout, TaskStatus};
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    struct TestApp {
        _dir: tempfile::TempDir,
        state: AppState,
    }

    fn app(body: &str) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("base"));
        layout.ensure().unwrap();
        let generator = Generator::new(fake_generator(dir.path(), body, Duration::from_secs(10)));
        TestApp {
            state: AppState::new(JobManager::new(layout, generator, 1)),
            _dir: dir,
        }
    }

    /// (nombre, nombre de archivo, valor)
    fn multipart(fields: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, file_name, value) in fields {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/generate-music")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn valid_submit(audio_length: &str) -> Request<Body> {
        multipart(&[
            ("lrc_file", Some("vergil.lrc"), "[00:00.00]hola\n"),
            ("ref_prompt", None, "hard rock, aggressive mood"),
            ("audio_length", None, audio_length),
            ("use_chunked", None, "true"),
        ])
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let ctype = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec(), ctype)
    }

    async fn wait_terminal(state: &AppState, id: &str) -> TaskRecord {
        for _ in 0..400 {
            let (status, body, _) = send(state, get(&format!("/status/{id}"))).await;
            assert_eq!(status, StatusCode::OK);
            let r: TaskRecord = serde_json::from_slice(&body).unwrap();
            if r.status().is_terminal() {
                return r;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("la tarea {id} no terminó");
    }

    #[tokio::test]
    async fn models_lista_el_catalogo() {
        let t = app(WRITES_WAV);
        let (status, body, _) = send(&t.state, get("/models")).await;

        assert_eq!(status, StatusCode::OK);
        let cat: ModelCatalog = serde_json::from_slice(&body).unwrap();
        assert_eq!(cat.models.len(), 3);
    }

    #[tokio::test]
    async fn duracion_invalida_da_400_sin_crear_tarea() {
        let t = app(WRITES_WAV);
        let (status, body, _) = send(&t.state, valid_submit("100")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(err.detail.contains("95 or 285"));
        assert_eq!(t.state.manager.task_count(), 0);
    }

    #[tokio::test]
    async fn archivo_que_no_es_lrc_da_400() {
        let t = app(WRITES_WAV);
        let req = multipart(&[
            ("lrc_file", Some("letras.txt"), "[00:00.00]hola"),
            ("ref_prompt", None, "jazz"),
        ]);
        let (status, body, _) = send(&t.state, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.detail, "File must be an LRC file");
        assert_eq!(t.state.manager.task_count(), 0);
    }

    #[tokio::test]
    async fn falta_prompt_da_400() {
        let t = app(WRITES_WAV);
        let req = multipart(&[("lrc_file", Some("a.lrc"), "[00:00.00]hola")]);
        let (status, _, _) = send(&t.state, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(t.state.manager.task_count(), 0);
    }

    #[tokio::test]
    async fn flujo_completo_submit_status_download_cleanup() {
        let t = app(WRITES_WAV);

        let (status, body, _) = send(&t.state, valid_submit("95")).await;
        assert_eq!(status, StatusCode::OK);
        let accepted: SubmitResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(accepted.status, "accepted");
        let id = accepted.task_id;

        let record = wait_terminal(&t.state, &id).await;
        assert_eq!(record.status(), TaskStatus::Completed);
        assert_eq!(record.progress, 100);

        let (status, body, ctype) = send(&t.state, get(&format!("/download/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"RIFFfake");
        assert_eq!(ctype.as_deref(), Some("audio/wav"));

        let del = |id: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/cleanup/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _, _) = send(&t.state, del(&id)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&t.state, get(&format!("/status/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&t.state, del(&id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn descargar_mientras_procesa_da_400() {
        let t = app("sleep 2; printf x > \"$out/a.wav\"");

        let (_, body, _) = send(&t.state, valid_submit("285")).await;
        let accepted: SubmitResponse = serde_json::from_slice(&body).unwrap();

        let (status, body, _) =
            send(&t.state, get(&format!("/download/{}", accepted.task_id))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.detail, "Generation not completed");
    }

    #[tokio::test]
    async fn status_de_id_desconocido_da_404() {
        let t = app(WRITES_WAV);
        let (status, body, _) = send(&t.state, get("/status/no-existe")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.detail, "Task not found");
    }

    #[tokio::test]
    async fn health_reporta_contadores() {
        let t = app(WRITES_WAV);
        let (status, body, _) = send(&t.state, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        let h: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(h.status, "healthy");
        assert_eq!(h.active_generations, 0);
        assert_eq!(h.queued_generations, 0);
    }

    #[test]
    fn parse_bool_acepta_formas_comunes() {
        assert!(parse_bool("use_chunked", "True").unwrap());
        assert!(!parse_bool("use_chunked", "0").unwrap());
        assert!(parse_bool("use_chunked", "quizas").is_err());
    }
}
