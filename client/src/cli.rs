use std::{env, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{
    CleanupResponse, ErrorBody, HealthResponse, ModelCatalog, SubmitResponse, TaskRecord,
    TaskStatus, DEFAULT_MODEL_ID,
};
use reqwest::{multipart, Client, Response};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// - En Docker: SERVER_URL=http://server:8000
/// - Local: default http://localhost:8000
fn server_base_url() -> String {
    env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para hablar con el servicio de generación de música")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lista los modelos disponibles
    Models,
    /// Sube un archivo LRC y encola una generación
    Submit {
        #[arg(value_name = "LRC")]
        lrc: PathBuf,
        #[arg(value_name = "PROMPT")]
        prompt: String,
        /// 95 o 285 segundos
        #[arg(long, default_value_t = 95)]
        audio_length: u32,
        #[arg(long, default_value = DEFAULT_MODEL_ID)]
        model: String,
        #[arg(long, default_value_t = 1)]
        batch: u32,
        /// Desactiva la decodificación por bloques
        #[arg(long)]
        no_chunked: bool,
    },
    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Espera hasta que la tarea termine
    Wait {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Descarga el audio generado
    Download {
        #[arg(value_name = "TASK_ID")]
        id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Borra la tarea y sus archivos
    Cleanup {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    Health,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = server_base_url();

    match cli.command {
        Commands::Models => {
            let resp = checked(client.get(format!("{base_url}/models")).send().await?).await?;
            let catalog: ModelCatalog = resp.json().await?;
            for m in catalog.models {
                println!("{} (máx. {}s)", m.id, m.max_length);
                println!("  {}: {}", m.name, m.description);
            }
        }

        Commands::Submit {
            lrc,
            prompt,
            audio_length,
            model,
            batch,
            no_chunked,
        } => {
            let bytes = tokio::fs::read(&lrc)
                .await
                .with_context(|| format!("no se pudo leer {}", lrc.display()))?;
            let file_name = lrc
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input.lrc".to_string());

            let form = multipart::Form::new()
                .part(
                    "lrc_file",
                    multipart::Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str("text/plain")?,
                )
                .text("ref_prompt", prompt)
                .text("audio_length", audio_length.to_string())
                .text("model_id", model)
                .text("batch_infer_num", batch.to_string())
                .text("use_chunked", (!no_chunked).to_string());

            let resp = client
                .post(format!("{base_url}/generate-music"))
                .multipart(form)
                .send()
                .await?;
            let accepted: SubmitResponse = checked(resp).await?.json().await?;

            println!("Tarea creada:");
            println!("  id: {}", accepted.task_id);
            println!("  estado: {}", accepted.status);
            println!("  tiempo estimado: {}", accepted.estimated_time);
        }

        Commands::Status { id } => {
            let record = fetch_status(&client, &base_url, &id).await?;
            print_record(&record);
        }

        Commands::Wait { id } => loop {
            let record = fetch_status(&client, &base_url, &id).await?;
            println!("[{:>3}%] {} - {}", record.progress, record.status(), record.message);
            if record.status().is_terminal() {
                print_record(&record);
                if record.status() == TaskStatus::Failed {
                    bail!("la tarea {id} falló");
                }
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        },

        Commands::Download { id, output } => {
            let resp = client.get(format!("{base_url}/download/{id}")).send().await?;
            let resp = checked(resp).await?;
            let ext = match resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
            {
                Some("audio/mpeg") => "mp3",
                _ => "wav",
            };
            let path =
                output.unwrap_or_else(|| PathBuf::from(format!("generated_music_{id}.{ext}")));
            let bytes = resp.bytes().await?;
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("no se pudo escribir {}", path.display()))?;
            println!("{} bytes guardados en {}", bytes.len(), path.display());
        }

        Commands::Cleanup { id } => {
            let resp = client.delete(format!("{base_url}/cleanup/{id}")).send().await?;
            let done: CleanupResponse = checked(resp).await?.json().await?;
            println!("{}", done.message);
        }

        Commands::Health => {
            let resp = checked(client.get(format!("{base_url}/health")).send().await?).await?;
            let h: HealthResponse = resp.json().await?;
            println!("estado         : {}", h.status);
            println!("gpu disponible : {}", h.gpu_available);
            if let Some(info) = h.gpu_info {
                println!("gpu            : {}", info);
            }
            println!("activas        : {}", h.active_generations);
            println!("en cola        : {}", h.queued_generations);
        }
    }

    Ok(())
}

async fn fetch_status(client: &Client, base_url: &str, id: &str) -> Result<TaskRecord> {
    let resp = client.get(format!("{base_url}/status/{id}")).send().await?;
    Ok(checked(resp).await?.json().await?)
}

/// Convierte una respuesta de error del servidor en un error con su `detail`.
async fn checked(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = match resp.json::<ErrorBody>().await {
        Ok(body) => body.detail,
        Err(_) => "(sin detalle)".to_string(),
    };
    bail!("el servidor respondió {status}: {detail}")
}

fn print_record(r: &TaskRecord) {
    println!("Tarea:");
    println!("  id: {}", r.task_id);
    println!("  estado: {}", r.status());
    println!("  progreso: {}%", r.progress);
    println!("  mensaje: {}", r.message);
    println!("  prompt: {}", r.ref_prompt);
    println!("  modelo: {}", r.model_id);
    println!("  creada: {}", r.created_at);
    if let Some(started) = r.started_at {
        println!("  iniciada: {}", started);
    }
    if let Some(done) = r.finished_at {
        println!("  finalizada: {}", done);
    }
    if let Some((path, size)) = r.artifact() {
        println!("  archivo: {} ({} bytes)", path.display(), size);
    }
    if let Some(err) = r.error() {
        println!("  error: {}", err);
    }
}
