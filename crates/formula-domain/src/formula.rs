// formula.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fórmula (receta de sabor/perfume), posiblemente miembro de un grupo de
/// variaciones.
///
/// `variation_group_id == None` significa "no pertenece a ningún grupo".
/// Dentro de un grupo, exactamente un miembro lleva `is_main_variation`;
/// el invariante lo mantiene la operación `set_main_variation` del
/// repositorio, nunca esta estructura por sí sola.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
  id: Uuid,
  owner_id: Uuid,
  name: String,
  description: Option<String>,
  variation_group_id: Option<Uuid>,
  variation_label: Option<String>,
  is_main_variation: bool,
  created_at: DateTime<Utc>,
}

impl Formula {
  pub fn new(owner_id: Uuid, name: &str) -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre de la fórmula no puede estar vacío".to_string()));
    }
    Ok(Self { id: Uuid::new_v4(),
              owner_id,
              name: name.trim().to_string(),
              description: None,
              variation_group_id: None,
              variation_label: None,
              is_main_variation: false,
              created_at: Utc::now() })
  }

  /// Reconstruye una fórmula desde sus partes persistidas, validando.
  #[allow(clippy::too_many_arguments)]
  pub fn from_parts(id: Uuid,
                    owner_id: Uuid,
                    name: &str,
                    description: Option<String>,
                    variation_group_id: Option<Uuid>,
                    variation_label: Option<String>,
                    is_main_variation: bool,
                    created_at: DateTime<Utc>)
                    -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre de la fórmula no puede estar vacío".to_string()));
    }
    if is_main_variation && variation_group_id.is_none() {
      return Err(DomainError::ValidationError("Una fórmula sin grupo no puede ser variación principal".to_string()));
    }
    Ok(Self { id,
              owner_id,
              name: name.trim().to_string(),
              description,
              variation_group_id,
              variation_label,
              is_main_variation,
              created_at })
  }

  /// Copia de esta fórmula incorporada a un grupo con la etiqueta dada.
  pub fn with_variation(&self, group_id: Uuid, label: Option<String>, is_main: bool) -> Self {
    let mut f = self.clone();
    f.variation_group_id = Some(group_id);
    f.variation_label = label;
    f.is_main_variation = is_main;
    f
  }

  pub fn with_main(&self, is_main: bool) -> Self {
    let mut f = self.clone();
    f.is_main_variation = is_main;
    f
  }

  pub fn with_label(&self, label: impl Into<String>) -> Self {
    let mut f = self.clone();
    f.variation_label = Some(label.into());
    f
  }

  pub fn with_description(&self, description: Option<String>) -> Self {
    let mut f = self.clone();
    f.description = description;
    f
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn owner_id(&self) -> Uuid {
    self.owner_id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn variation_group_id(&self) -> Option<Uuid> {
    self.variation_group_id
  }

  pub fn variation_label(&self) -> Option<&str> {
    self.variation_label.as_deref()
  }

  pub fn is_main_variation(&self) -> bool {
    self.is_main_variation
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  /// Nombre a mostrar: etiqueta de variación si existe, si no el nombre.
  pub fn display_label(&self) -> &str {
    self.variation_label.as_deref().unwrap_or(&self.name)
  }
}

impl fmt::Display for Formula {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Formula(id: {}, name: {}, label: {})",
           self.id,
           self.name,
           self.variation_label.as_deref().unwrap_or("-"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formula_requires_name() {
    let owner = Uuid::new_v4();
    assert!(Formula::new(owner, "").is_err());
    assert!(Formula::new(owner, "Fresa base").is_ok());
  }

  #[test]
  fn main_requires_group() {
    let owner = Uuid::new_v4();
    let res = Formula::from_parts(Uuid::new_v4(), owner, "X", None, None, None, true, Utc::now());
    assert!(res.is_err());
  }

  #[test]
  fn with_variation_keeps_identity() -> Result<(), DomainError> {
    let owner = Uuid::new_v4();
    let f = Formula::new(owner, "Fresa base")?;
    let g = Uuid::new_v4();
    let v = f.with_variation(g, Some("Light".into()), false);
    assert_eq!(v.id(), f.id());
    assert_eq!(v.variation_group_id(), Some(g));
    assert_eq!(v.variation_label(), Some("Light"));
    assert_eq!(v.display_label(), "Light");
    assert_eq!(f.display_label(), "Fresa base");
    Ok(())
  }
}
