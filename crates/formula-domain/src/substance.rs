// substance.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sustancia química del catálogo (ingrediente de fórmulas).
///
/// El motor de comparación la trata como solo-lectura: las sustancias se
/// crean al sembrar el catálogo y nunca se modifican desde aquí.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substance {
  id: Uuid,
  name: String,
  odor: Option<String>,
  fema_number: Option<i32>,
  cas_number: Option<String>,
}

impl Substance {
  fn build(id: Uuid,
           name: &str,
           odor: Option<String>,
           fema_number: Option<i32>,
           cas_number: Option<String>)
           -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre de la sustancia no puede estar vacío".to_string()));
    }
    if let Some(fema) = fema_number {
      if fema <= 0 {
        return Err(DomainError::ValidationError("El número FEMA debe ser positivo".to_string()));
      }
    }
    Ok(Self { id, name: name.trim().to_string(), odor, fema_number, cas_number })
  }

  pub fn new(name: &str) -> Result<Self, DomainError> {
    Self::build(Uuid::new_v4(), name, None, None, None)
  }

  /// Reconstruye una sustancia desde sus partes persistidas, validando.
  pub fn from_parts(id: Uuid,
                    name: &str,
                    odor: Option<String>,
                    fema_number: Option<i32>,
                    cas_number: Option<String>)
                    -> Result<Self, DomainError> {
    Self::build(id, name, odor, fema_number, cas_number)
  }

  pub fn with_odor(&self, odor: impl Into<String>) -> Self {
    let mut s = self.clone();
    s.odor = Some(odor.into());
    s
  }

  pub fn with_fema_number(&self, fema: i32) -> Result<Self, DomainError> {
    if fema <= 0 {
      return Err(DomainError::ValidationError("El número FEMA debe ser positivo".to_string()));
    }
    let mut s = self.clone();
    s.fema_number = Some(fema);
    Ok(s)
  }

  pub fn with_cas_number(&self, cas: impl Into<String>) -> Self {
    let mut s = self.clone();
    s.cas_number = Some(cas.into());
    s
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn odor(&self) -> Option<&str> {
    self.odor.as_deref()
  }

  pub fn fema_number(&self) -> Option<i32> {
    self.fema_number
  }

  pub fn cas_number(&self) -> Option<&str> {
    self.cas_number.as_deref()
  }
}

impl fmt::Display for Substance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Substance({}, FEMA: {})",
           self.name,
           self.fema_number.map(|n| n.to_string()).unwrap_or_else(|| "-".into()))
  }
}
