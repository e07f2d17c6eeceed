use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_BASE_DIR: &str = "/app";
pub const DEFAULT_INFER_PROGRAM: &str = "python3";
pub const DEFAULT_INFER_SCRIPT: &str = "infer/infer.py";
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_CONCURRENT_GENERATIONS: usize = 1;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Lee una variable numérica; si no parsea, avisa y usa el valor por defecto.
fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{key}={raw:?} no es válido, usando {default}");
            default
        }),
        Err(_) => default,
    }
}

/// Cómo lanzar el programa de inferencia externo.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub program: String,
    /// Argumentos que van antes del contrato (normalmente el script)
    pub base_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, OsString)>,
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub fn from_env(base_dir: &Path) -> Self {
        let mut env_vars = vec![(
            "CUDA_VISIBLE_DEVICES".to_string(),
            OsString::from(env_or("CUDA_VISIBLE_DEVICES", "0")),
        )];

        // PYTHONPATH existente + directorio base
        let mut paths: Vec<PathBuf> = env::var_os("PYTHONPATH")
            .map(|p| env::split_paths(&p).collect())
            .unwrap_or_default();
        paths.push(base_dir.to_path_buf());
        if let Ok(joined) = env::join_paths(paths) {
            env_vars.push(("PYTHONPATH".to_string(), joined));
        }

        Self {
            program: env_or("INFER_PROGRAM", DEFAULT_INFER_PROGRAM),
            base_args: env_or("INFER_SCRIPT", DEFAULT_INFER_SCRIPT)
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            working_dir: Some(base_dir.to_path_buf()),
            env: env_vars,
            timeout: Duration::from_secs(env_parse(
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )),
        }
    }
}

/// Directorios del servicio: `temp/` guarda las letras subidas mientras la
/// tarea corre, `output/<task_id>/` guarda lo generado.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir.join("temp")
    }

    pub fn output_root(&self) -> PathBuf {
        self.base_dir.join("output")
    }

    pub fn task_output_dir(&self, id: &str) -> PathBuf {
        self.output_root().join(id)
    }

    /// Ruta del archivo de letras subido; sólo se usa el nombre final del
    /// archivo del cliente para que no pueda escapar de `temp/`.
    pub fn upload_path(&self, id: &str, client_file_name: &str) -> PathBuf {
        let name = Path::new(client_file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.lrc".to_string());
        self.temp_dir().join(format!("{id}_{name}"))
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [self.temp_dir(), self.output_root()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("no se pudo crear {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub storage: StorageLayout,
    pub generator: GeneratorConfig,
    /// Cuántas generaciones pueden correr a la vez (huecos del acelerador)
    pub max_concurrent_generations: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let base_dir = PathBuf::from(env_or("BASE_DIR", DEFAULT_BASE_DIR));
        let max = env_parse(
            "MAX_CONCURRENT_GENERATIONS",
            DEFAULT_MAX_CONCURRENT_GENERATIONS,
        );

        Self {
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            generator: GeneratorConfig::from_env(&base_dir),
            storage: StorageLayout::new(base_dir),
            max_concurrent_generations: max.max(1),
        }
    }
}
