use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::DEFAULT_MODEL_ID;

pub const DEFAULT_BATCH_INFER_NUM: u32 = 1;

/// Duraciones soportadas por el generador: 1m35s o 4m45s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AudioLength {
    #[default]
    Short,
    Full,
}

impl AudioLength {
    pub const fn seconds(self) -> u32 {
        match self {
            Self::Short => 95,
            Self::Full => 285,
        }
    }
}

impl TryFrom<u32> for AudioLength {
    type Error = ValidationError;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        match secs {
            95 => Ok(Self::Short),
            285 => Ok(Self::Full),
            other => Err(ValidationError::UnsupportedAudioLength(other)),
        }
    }
}

impl From<AudioLength> for u32 {
    fn from(len: AudioLength) -> u32 {
        len.seconds()
    }
}

impl fmt::Display for AudioLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seconds())
    }
}

/// Parámetros tal como llegan de una fachada, todavía sin validar.
///
/// Es también el formato del campo `input` del handler de arranque en frío.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default)]
    pub lrc_content: Option<String>,
    #[serde(default)]
    pub ref_prompt: Option<String>,
    #[serde(default)]
    pub audio_length: Option<u32>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub batch_infer_num: Option<u32>,
    #[serde(default)]
    pub use_chunked: Option<bool>,
}

impl GenerationParams {
    /// Valida y normaliza. Un texto vacío cuenta como ausente.
    pub fn validate(self) -> Result<GenerationRequest, ValidationError> {
        let lrc_content = self
            .lrc_content
            .filter(|s| !s.trim().is_empty())
            .ok_or(ValidationError::MissingField("lrc_content"))?;

        let ref_prompt = self
            .ref_prompt
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("ref_prompt"))?;

        let audio_length = match self.audio_length {
            Some(secs) => AudioLength::try_from(secs)?,
            None => AudioLength::default(),
        };

        let batch_infer_num = self.batch_infer_num.unwrap_or(DEFAULT_BATCH_INFER_NUM);
        if batch_infer_num < 1 {
            return Err(ValidationError::InvalidBatchCount(batch_infer_num));
        }

        let model_id = self
            .model_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Ok(GenerationRequest {
            lrc_content,
            ref_prompt,
            audio_length,
            model_id,
            batch_infer_num,
            chunked: self.use_chunked.unwrap_or(true),
        })
    }
}

/// Petición de generación ya validada. Inmutable una vez aceptada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    #[serde(skip)]
    lrc_content: String,
    ref_prompt: String,
    audio_length: AudioLength,
    model_id: String,
    batch_infer_num: u32,
    chunked: bool,
}

impl GenerationRequest {
    pub fn lrc_content(&self) -> &str {
        &self.lrc_content
    }

    pub fn ref_prompt(&self) -> &str {
        &self.ref_prompt
    }

    pub fn audio_length(&self) -> AudioLength {
        self.audio_length
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn batch_infer_num(&self) -> u32 {
        self.batch_infer_num
    }

    pub fn chunked(&self) -> bool {
        self.chunked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams {
            lrc_content: Some("[00:00.00]hola".to_string()),
            ref_prompt: Some("pop ballad, emotional piano".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn aplica_valores_por_defecto() {
        let req = params().validate().unwrap();

        assert_eq!(req.audio_length(), AudioLength::Short);
        assert_eq!(req.model_id(), DEFAULT_MODEL_ID);
        assert_eq!(req.batch_infer_num(), 1);
        assert!(req.chunked());
    }

    #[test]
    fn rechaza_duracion_no_soportada() {
        let mut p = params();
        p.audio_length = Some(100);

        assert_eq!(
            p.validate().unwrap_err(),
            ValidationError::UnsupportedAudioLength(100)
        );
    }

    #[test]
    fn acepta_duracion_larga() {
        let mut p = params();
        p.audio_length = Some(285);

        assert_eq!(p.validate().unwrap().audio_length().seconds(), 285);
    }

    #[test]
    fn prompt_en_blanco_cuenta_como_ausente() {
        let mut p = params();
        p.ref_prompt = Some("   ".to_string());

        assert_eq!(
            p.validate().unwrap_err(),
            ValidationError::MissingField("ref_prompt")
        );
    }

    #[test]
    fn falta_lrc_se_reporta_primero() {
        let p = GenerationParams::default();

        assert_eq!(
            p.validate().unwrap_err(),
            ValidationError::MissingField("lrc_content")
        );
    }

    #[test]
    fn batch_cero_es_invalido() {
        let mut p = params();
        p.batch_infer_num = Some(0);

        assert_eq!(
            p.validate().unwrap_err(),
            ValidationError::InvalidBatchCount(0)
        );
    }

    #[test]
    fn audio_length_se_deserializa_desde_numero() {
        let len: AudioLength = serde_json::from_str("285").unwrap();
        assert_eq!(len, AudioLength::Full);

        assert!(serde_json::from_str::<AudioLength>("100").is_err());
    }
}
