//! Generadores falsos para tests: scripts de `sh` que respetan el mismo
//! contrato de línea de comando que el programa de inferencia real.

use std::{fs, path::Path, time::Duration};

use crate::config::GeneratorConfig;
use crate::request::{GenerationParams, GenerationRequest};

/// Escribe un wav de 8 bytes en el directorio de salida.
pub const WRITES_WAV: &str = r#"printf 'RIFFfake' > "$out/output_0.wav""#;

/// Termina bien sin escribir nada.
pub const WRITES_NOTHING: &str = "exit 0";

/// Falla con un mensaje en stderr.
pub const FAILS: &str = "echo 'CUDA out of memory' >&2; exit 1";

/// Config que ejecuta `body` con `sh`. Dentro de `body`, `$out` es el valor
/// de `--output-dir`.
pub fn fake_generator(dir: &Path, body: &str, timeout: Duration) -> GeneratorConfig {
    let script = dir.join("fake_infer.sh");
    let prelude = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;
    fs::write(&script, format!("{prelude}\n{body}\n")).expect("no se pudo escribir el script");

    GeneratorConfig {
        program: "sh".to_string(),
        base_args: vec![script.to_string_lossy().into_owned()],
        working_dir: Some(dir.to_path_buf()),
        env: Vec::new(),
        timeout,
    }
}

pub fn params() -> GenerationParams {
    GenerationParams {
        lrc_content: Some("[00:00.00]hola\n[00:05.00]mundo".to_string()),
        ref_prompt: Some("hard rock, aggressive mood, electric guitar and drums".to_string()),
        ..Default::default()
    }
}

pub fn request() -> GenerationRequest {
    params().validate().expect("parámetros de prueba válidos")
}
