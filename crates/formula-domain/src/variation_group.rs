// variation_group.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Grupo de variaciones: conjunto nombrado de fórmulas que comparan entre
/// sí. Se crea al derivar la primera variación de una fórmula y desaparece
/// cuando se elimina su último miembro o se purga la cuenta dueña.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationGroup {
  id: Uuid,
  owner_id: Uuid,
  name: String,
  description: Option<String>,
  created_at: DateTime<Utc>,
}

impl VariationGroup {
  pub fn new(owner_id: Uuid, name: &str) -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre del grupo no puede estar vacío".to_string()));
    }
    Ok(Self { id: Uuid::new_v4(),
              owner_id,
              name: name.trim().to_string(),
              description: None,
              created_at: Utc::now() })
  }

  /// Reconstruye un grupo desde sus partes persistidas, validando.
  pub fn from_parts(id: Uuid,
                    owner_id: Uuid,
                    name: &str,
                    description: Option<String>,
                    created_at: DateTime<Utc>)
                    -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre del grupo no puede estar vacío".to_string()));
    }
    Ok(Self { id, owner_id, name: name.trim().to_string(), description, created_at })
  }

  pub fn with_description(&self, description: impl Into<String>) -> Self {
    let mut g = self.clone();
    g.description = Some(description.into());
    g
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

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }
}

impl fmt::Display for VariationGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "VariationGroup(id: {}, name: {})", self.id, self.name)
  }
}
