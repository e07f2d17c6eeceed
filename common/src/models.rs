use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_ID: &str = "ASLP-lab/DiffRhythm-1_2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Duración máxima soportada, en segundos
    pub max_length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelInfo>,
}

/// Modelos conocidos por el servicio. El generador acepta cualquier id de
/// repositorio; esta lista es sólo informativa para los clientes.
pub fn catalog() -> ModelCatalog {
    let entry = |id: &str, name: &str, description: &str, max_length| ModelInfo {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        max_length,
    };

    ModelCatalog {
        models: vec![
            entry(
                DEFAULT_MODEL_ID,
                "DiffRhythm v1.2",
                "Latest version with improved quality and reduced repetition",
                95,
            ),
            entry(
                "ASLP-lab/DiffRhythm-base",
                "DiffRhythm Base",
                "Base model for 1m35s generation",
                95,
            ),
            entry(
                "ASLP-lab/DiffRhythm-full",
                "DiffRhythm Full",
                "Full model for 4m45s generation",
                285,
            ),
        ],
    }
}
