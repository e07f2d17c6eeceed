use std::{process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceleratorStatus {
    pub available: bool,
    pub info: Option<String>,
}

impl AcceleratorStatus {
    fn unavailable() -> Self {
        Self {
            available: false,
            info: None,
        }
    }
}

/// Consulta `nvidia-smi`. Cualquier fallo (no instalado, código distinto de
/// cero, timeout) cuenta como acelerador no disponible.
pub async fn probe_accelerator() -> AcceleratorStatus {
    probe_with(
        "nvidia-smi",
        &[
            "--query-gpu=name,memory.used,memory.total",
            "--format=csv,noheader,nounits",
        ],
    )
    .await
}

async fn probe_with(program: &str, args: &[&str]) -> AcceleratorStatus {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => {
            let info = String::from_utf8_lossy(&out.stdout).trim().to_string();
            AcceleratorStatus {
                available: true,
                info: (!info.is_empty()).then_some(info),
            }
        }
        Ok(Ok(out)) => {
            debug!("{} terminó con {}", program, out.status);
            AcceleratorStatus::unavailable()
        }
        Ok(Err(e)) => {
            debug!("no se pudo ejecutar {}: {}", program, e);
            AcceleratorStatus::unavailable()
        }
        Err(_) => {
            debug!("{} no respondió en {:?}", program, PROBE_TIMEOUT);
            AcceleratorStatus::unavailable()
        }
    }
}
