// errors.rs
use thiserror::Error;

/// Errores del dominio de formulación.
///
/// - `NotFound`: fórmula, grupo o sustancia inexistente.
/// - `Unauthorized`: el llamante no es dueño del recurso.
/// - `ValidationError`: entrada malformada, detectada antes de escribir.
/// - `DuplicateLabel`: etiqueta de variación repetida dentro del grupo.
/// - `PersistenceError`: fallo del almacenamiento subyacente.
#[derive(Debug, Error, Clone)]
pub enum DomainError {
  #[error("No encontrado: {0}")]
  NotFound(String),
  #[error("No autorizado: {0}")]
  Unauthorized(String),
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("Etiqueta duplicada: {0}")]
  DuplicateLabel(String),
  #[error("Error de persistencia: {0}")]
  PersistenceError(String),
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::PersistenceError(e.to_string())
  }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, DomainError>;
