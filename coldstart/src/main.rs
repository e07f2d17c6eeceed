mod handler;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use common::config::DEFAULT_BASE_DIR;
use common::{ColdStartResponse, Generator, GeneratorConfig};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coldstart")]
#[command(about = "Ejecuta una generación completa y escribe la respuesta JSON en stdout")]
struct Args {
    /// Archivo con el evento JSON (por defecto se lee stdin)
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Además escribe el audio decodificado en esta ruta
    #[arg(long, value_name = "PATH")]
    save_audio: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout queda reservado para la respuesta
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coldstart=debug,common=debug")),
        )
        .init();

    let args = Args::parse();

    let raw = match &args.input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("no se pudo leer {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let base_dir = std::env::var("BASE_DIR").unwrap_or_else(|_| DEFAULT_BASE_DIR.to_string());
    let generator = Generator::new(GeneratorConfig::from_env(Path::new(&base_dir)));

    let response = match serde_json::from_str::<Value>(&raw) {
        Ok(event) => handler::handle(&generator, event).await,
        Err(e) => ColdStartResponse::failure(format!("Invalid input: {e}")),
    };

    if let Some(path) = &args.save_audio {
        if let Some(audio) = handler::decode_audio(&response) {
            tokio::fs::write(path, audio?)
                .await
                .with_context(|| format!("no se pudo escribir {}", path.display()))?;
            info!("audio guardado en {}", path.display());
        }
    }

    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;

    Ok(())
}
