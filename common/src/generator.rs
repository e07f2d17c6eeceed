//! Invocación del programa de generación externo.
//!
//! El programa es opaco: recibe la ruta del archivo de letras, el prompt de
//! estilo, la duración, el id del modelo, el número de canciones y el flag de
//! decodificación por bloques; escribe cero o más archivos de audio en el
//! directorio de salida y señala éxito o fallo con el código de salida.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::request::GenerationRequest;

/// Máximo de bytes que se conservan de stdout/stderr (se guarda el final).
pub const MAX_CAPTURED_BYTES: usize = 4096;

/// Extensiones aceptadas como artefacto, en orden de preferencia.
pub const ARTIFACT_EXTENSIONS: [&str; 2] = ["wav", "mp3"];

/// Línea de comando ya serializada para una petición concreta.
#[derive(Debug, Clone)]
pub struct GeneratorCommand {
    program: String,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, OsString)>,
}

impl GeneratorCommand {
    pub fn build(
        config: &GeneratorConfig,
        req: &GenerationRequest,
        lrc_path: &Path,
        output_dir: &Path,
    ) -> Self {
        let mut args: Vec<OsString> = config.base_args.iter().map(OsString::from).collect();

        let mut flag = |name: &str, value: OsString| {
            args.push(OsString::from(name));
            args.push(value);
        };
        flag("--lrc-path", lrc_path.as_os_str().to_owned());
        flag("--ref-prompt", req.ref_prompt().into());
        flag("--audio-length", req.audio_length().to_string().into());
        flag("--repo-id", req.model_id().into());
        flag("--output-dir", output_dir.as_os_str().to_owned());
        flag("--batch-infer-num", req.batch_infer_num().to_string().into());

        if req.chunked() {
            args.push(OsString::from("--chunked"));
        }

        Self {
            program: config.program.clone(),
            args,
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Versión legible para logs.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    fn into_command(self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // grupo propio: al vencer el plazo se mata también a los descendientes
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    pub file_size: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Generator {
    config: Arc<GeneratorConfig>,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Corre el programa externo y localiza el audio producido en
    /// `output_dir`. Sólo escribe dentro de `output_dir`.
    pub async fn generate(
        &self,
        req: &GenerationRequest,
        lrc_path: &Path,
        output_dir: &Path,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let cmd = GeneratorCommand::build(&self.config, req, lrc_path, output_dir);
        info!("ejecutando generador: {}", cmd.display());

        let program = cmd.program().to_string();
        let start = Instant::now();
        // un único plazo para la espera y para drenar las salidas
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let timed_out = GenerationError::Timeout {
            seconds: self.config.timeout.as_secs(),
        };

        let mut child = cmd
            .into_command()
            .spawn()
            .map_err(|source| GenerationError::Spawn { program, source })?;
        let pid = child.id();

        // Drenar las dos salidas en paralelo para que el proceso no se
        // bloquee con la tubería llena.
        let mut stdout_task = tokio::spawn(capture_tail(child.stdout.take()));
        let mut stderr_task = tokio::spawn(capture_tail(child.stderr.take()));

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(GenerationError::Io(e));
            }
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!("no se pudo matar el generador tras el timeout: {e}");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(timed_out);
            }
        };

        // Un descendiente que hereda stdout/stderr mantiene las tuberías
        // abiertas aunque el proceso principal ya haya salido.
        let drained = tokio::time::timeout_at(deadline, async {
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match drained {
            Ok(out) => out,
            Err(_) => {
                warn!("el generador salió con {status} pero sus descendientes siguen vivos");
                kill_process_group(pid);
                stdout_task.abort();
                stderr_task.abort();
                return Err(timed_out);
            }
        };
        let elapsed = start.elapsed();

        if !status.success() {
            let detail = [&stderr, &stdout]
                .into_iter()
                .find(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(GenerationError::Process {
                code: status.code(),
                detail,
            });
        }

        if !stdout.is_empty() {
            debug!("salida del generador: {}", stdout.trim());
        }

        let path = find_artifact(output_dir).ok_or_else(|| GenerationError::NoOutputProduced {
            dir: output_dir.to_path_buf(),
        })?;
        let file_size = tokio::fs::metadata(&path).await?.len();

        info!(
            "generación terminada en {:.2}s: {} ({} bytes)",
            elapsed.as_secs_f64(),
            path.display(),
            file_size
        );

        Ok(GeneratedArtifact {
            path,
            file_size,
            elapsed,
        })
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!("killpg({}) falló: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Primer archivo de audio en `dir`, prefiriendo wav sobre mp3.
/// Con varias canciones (batch > 1) se devuelve la primera en orden
/// alfabético.
pub fn find_artifact(dir: &Path) -> Option<PathBuf> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());

    ARTIFACT_EXTENSIONS.iter().find_map(|ext| {
        let pattern = format!("{escaped}/*.{ext}");
        glob::glob(&pattern)
            .ok()?
            .flatten()
            .find(|p| p.is_file())
    })
}

/// Lee un stream hasta EOF conservando sólo los últimos
/// `MAX_CAPTURED_BYTES` bytes.
async fn capture_tail<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut total = 0usize;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                total += n;
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > 2 * MAX_CAPTURED_BYTES {
                    buf.drain(..buf.len() - MAX_CAPTURED_BYTES);
                }
            }
        }
    }

    let start = buf.len().saturating_sub(MAX_CAPTURED_BYTES);
    let text = String::from_utf8_lossy(&buf[start..]).into_owned();
    if total > MAX_CAPTURED_BYTES {
        format!("[truncated] {text}")
    } else {
        text
    }
}
