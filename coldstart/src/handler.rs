use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::request::DEFAULT_BATCH_INFER_NUM;
use common::{
    generate_inline, ColdStartEvent, ColdStartResponse, ColdStartSuccess, GenerationParams,
    GenerationRequest, Generator, ValidationError,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Ejecuta un evento completo. Siempre devuelve una respuesta estructurada:
/// cualquier error termina en `success: false`.
pub async fn handle(generator: &Generator, event: Value) -> ColdStartResponse {
    let event: ColdStartEvent = match serde_json::from_value(event) {
        Ok(ev) => ev,
        Err(e) => {
            warn!("evento inválido: {}", e);
            return ColdStartResponse::failure(format!("Invalid input: {e}"));
        }
    };

    // validar antes de tocar el generador
    let req = match cold_start_request(event.input) {
        Ok(req) => req,
        Err(e) => {
            warn!("petición rechazada: {}", e);
            return ColdStartResponse::failure(e.to_string());
        }
    };

    info!(
        "generando {}s con {} (prompt: {})",
        req.audio_length().seconds(),
        req.model_id(),
        req.ref_prompt()
    );

    match generate_inline(generator, &req).await {
        Ok(artifact) => {
            info!(
                "audio listo: {} bytes en {:.1}s",
                artifact.file_size,
                artifact.elapsed.as_secs_f64()
            );
            ColdStartResponse::Success(ColdStartSuccess {
                success: true,
                audio_base64: STANDARD.encode(&artifact.bytes),
                file_size: artifact.file_size,
                generation_time: artifact.elapsed.as_secs_f64(),
                audio_length: req.audio_length().seconds(),
                model_used: req.model_id().to_string(),
                prompt: req.ref_prompt().to_string(),
                message: "Music generation completed successfully".to_string(),
            })
        }
        Err(e) => {
            error!("generación fallida: {}", e);
            ColdStartResponse::failure(e.to_string())
        }
    }
}

/// La vía síncrona devuelve una sola canción: el batch siempre es 1.
fn cold_start_request(mut params: GenerationParams) -> Result<GenerationRequest, ValidationError> {
    if let Some(n) = params.batch_infer_num.filter(|&n| n != DEFAULT_BATCH_INFER_NUM) {
        debug!("batch_infer_num={} ignorado en arranque en frío", n);
    }
    params.batch_infer_num = Some(DEFAULT_BATCH_INFER_NUM);
    params.validate()
}

/// Decodifica el audio de una respuesta exitosa.
pub fn decode_audio(resp: &ColdStartResponse) -> Option<anyhow::Result<Vec<u8>>> {
    match resp {
        ColdStartResponse::Success(ok) => {
            Some(STANDARD.decode(&ok.audio_base64).map_err(Into::into))
        }
        ColdStartResponse::Failure(_) => None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use common::testutil::{fake_generator, FAILS, WRITES_WAV};
    use serde_json::json;
    use std::time::Duration;

    fn generator(dir: &tempfile::TempDir, body: &str) -> Generator {
        Generator::new(fake_generator(dir.path(), body, Duration::from_secs(10)))
    }

    fn event(input: Value) -> Value {
        json!({ "input": input })
    }

    #[tokio::test]
    async fn sin_prompt_falla_sin_invocar_al_generador() {
        let dir = tempfile::tempdir().unwrap();
        // si se invocara, dejaría una marca en el directorio
        let marker = dir.path().join("invocado");
        let gen = generator(&dir, &format!("touch '{}'", marker.display()));

        let resp = handle(&gen, event(json!({ "lrc_content": "[00:00.00]hola" }))).await;

        match resp {
            ColdStartResponse::Failure(f) => {
                assert!(!f.success);
                assert_eq!(f.error, "Missing required parameter: ref_prompt");
            }
            other => panic!("se esperaba fallo, llegó {other:?}"),
        }
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn duracion_no_soportada_falla() {
        let dir = tempfile::tempdir().unwrap();
        let gen = generator(&dir, WRITES_WAV);

        let resp = handle(
            &gen,
            event(json!({
                "lrc_content": "[00:00.00]hola",
                "ref_prompt": "jazz",
                "audio_length": 120
            })),
        )
        .await;

        assert!(!resp.is_success());
    }

    #[test]
    fn batch_siempre_es_uno() {
        let params: GenerationParams = serde_json::from_value(json!({
            "lrc_content": "[00:00.00]hola",
            "ref_prompt": "jazz",
            "batch_infer_num": 3
        }))
        .unwrap();

        assert_eq!(cold_start_request(params).unwrap().batch_infer_num(), 1);

        let sin_batch: GenerationParams =
            serde_json::from_value(json!({ "lrc_content": "x", "ref_prompt": "jazz" })).unwrap();
        assert_eq!(cold_start_request(sin_batch).unwrap().batch_infer_num(), 1);
    }

    #[tokio::test]
    async fn evento_sin_estructura_da_fallo_estructurado() {
        let dir = tempfile::tempdir().unwrap();
        let gen = generator(&dir, WRITES_WAV);

        let resp = handle(&gen, json!({ "input": "no es un objeto" })).await;
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn generacion_exitosa_devuelve_audio_en_base64() {
        let dir = tempfile::tempdir().unwrap();
        let gen = generator(&dir, WRITES_WAV);

        let resp = handle(
            &gen,
            event(json!({
                "lrc_content": "[00:00.00]hola",
                "ref_prompt": "pop, upbeat",
                "audio_length": 285,
                "use_chunked": false
            })),
        )
        .await;

        let audio = decode_audio(&resp).unwrap().unwrap();
        assert_eq!(audio, b"RIFFfake");
        match resp {
            ColdStartResponse::Success(ok) => {
                assert!(ok.success);
                assert_eq!(ok.file_size, 8);
                assert_eq!(ok.audio_length, 285);
                assert_eq!(ok.model_used, common::DEFAULT_MODEL_ID);
                assert_eq!(ok.prompt, "pop, upbeat");
            }
            other => panic!("se esperaba éxito, llegó {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallo_del_proceso_se_reporta_en_la_respuesta() {
        let dir = tempfile::tempdir().unwrap();
        let gen = generator(&dir, FAILS);

        let resp = handle(
            &gen,
            event(json!({ "lrc_content": "[00:00.00]hola", "ref_prompt": "rock" })),
        )
        .await;

        match resp {
            ColdStartResponse::Failure(f) => assert!(f.error.contains("CUDA out of memory")),
            other => panic!("se esperaba fallo, llegó {other:?}"),
        }
        assert!(decode_audio(&ColdStartResponse::failure("x")).is_none());
    }
}
