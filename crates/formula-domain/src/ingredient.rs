// ingredient.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unidad de la concentración de una sustancia dentro de una fórmula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcentrationUnit {
  GramsPerKilogram,
  Percent,
  PartsPerMillion,
}

impl ConcentrationUnit {
  pub fn as_str(&self) -> &'static str {
    match self {
      ConcentrationUnit::GramsPerKilogram => "g/kg",
      ConcentrationUnit::Percent => "%",
      ConcentrationUnit::PartsPerMillion => "ppm",
    }
  }

  /// Parseo inverso usado al deserializar filas persistidas.
  pub fn parse(s: &str) -> Result<Self, DomainError> {
    match s {
      "g/kg" => Ok(ConcentrationUnit::GramsPerKilogram),
      "%" => Ok(ConcentrationUnit::Percent),
      "ppm" => Ok(ConcentrationUnit::PartsPerMillion),
      other => Err(DomainError::PersistenceError(format!("unidad desconocida: {}", other))),
    }
  }
}

impl Default for ConcentrationUnit {
  fn default() -> Self {
    ConcentrationUnit::GramsPerKilogram
  }
}

impl fmt::Display for ConcentrationUnit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Asociación sustancia ↔ fórmula con su concentración.
///
/// Identidad compuesta (substance_id, formula_id): a lo sumo una fila por
/// par; el repositorio lo garantiza con semántica de upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaIngredient {
  formula_id: Uuid,
  substance_id: Uuid,
  concentration: f64,
  unit: ConcentrationUnit,
  position: i32,
}

impl FormulaIngredient {
  pub fn new(formula_id: Uuid,
             substance_id: Uuid,
             concentration: f64,
             unit: ConcentrationUnit,
             position: i32)
             -> Result<Self, DomainError> {
    validate_concentration(concentration)?;
    Ok(Self { formula_id, substance_id, concentration, unit, position })
  }

  pub fn formula_id(&self) -> Uuid {
    self.formula_id
  }

  pub fn substance_id(&self) -> Uuid {
    self.substance_id
  }

  pub fn concentration(&self) -> f64 {
    self.concentration
  }

  pub fn unit(&self) -> ConcentrationUnit {
    self.unit
  }

  pub fn position(&self) -> i32 {
    self.position
  }

  /// Copia con otra concentración (misma identidad compuesta).
  pub fn with_concentration(&self, concentration: f64) -> Result<Self, DomainError> {
    validate_concentration(concentration)?;
    let mut i = self.clone();
    i.concentration = concentration;
    Ok(i)
  }
}

/// Edición de concentración propuesta, tal como viaja en un commit por
/// lotes. DTO plano: los campos son públicos a propósito.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationEdit {
  pub formula_id: Uuid,
  pub substance_id: Uuid,
  pub concentration: f64,
}

impl ConcentrationEdit {
  /// Comprueba la edición antes de cualquier escritura.
  pub fn validate(&self) -> Result<(), DomainError> {
    validate_concentration(self.concentration)
  }
}

/// Regla única de validación de concentraciones: número finito y no
/// negativo. No se imponen máximos regulatorios.
pub(crate) fn validate_concentration(c: f64) -> Result<(), DomainError> {
  if !c.is_finite() || c < 0.0 {
    return Err(DomainError::ValidationError(format!("Concentración inválida: {}", c)));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_negative_and_non_finite() {
    let f = Uuid::new_v4();
    let s = Uuid::new_v4();
    assert!(FormulaIngredient::new(f, s, -1.0, ConcentrationUnit::default(), 0).is_err());
    assert!(FormulaIngredient::new(f, s, f64::NAN, ConcentrationUnit::default(), 0).is_err());
    assert!(FormulaIngredient::new(f, s, f64::INFINITY, ConcentrationUnit::default(), 0).is_err());
  }

  #[test]
  fn zero_is_a_valid_concentration() {
    // Cero explícito es distinto de "ausente"; debe poder guardarse.
    let f = Uuid::new_v4();
    let s = Uuid::new_v4();
    let i = FormulaIngredient::new(f, s, 0.0, ConcentrationUnit::GramsPerKilogram, 0).unwrap();
    assert_eq!(i.concentration(), 0.0);
  }

  #[test]
  fn unit_round_trip() {
    for u in [ConcentrationUnit::GramsPerKilogram, ConcentrationUnit::Percent, ConcentrationUnit::PartsPerMillion] {
      assert_eq!(ConcentrationUnit::parse(u.as_str()).unwrap(), u);
    }
    assert!(ConcentrationUnit::parse("mg").is_err());
  }
}
