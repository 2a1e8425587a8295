// Archivo: visibility_persistence.rs
// Propósito: almacén Diesel de preferencias de visibilidad de columnas,
// una fila por (usuario, grupo) con los ids visibles serializados como
// arreglo JSON.
use crate::domain_persistence::{DbPool, PooledConn};
use crate::schema::column_preferences::dsl as prefs_dsl;
use chrono::Utc;
use comparison::VisibilityStore;
use diesel::prelude::*;
use formula_domain::{DomainError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub struct DieselVisibilityStore {
  pool: Arc<DbPool>,
}

impl DieselVisibilityStore {
  pub(crate) fn with_pool(pool: Arc<DbPool>) -> Self {
    Self { pool }
  }

  fn conn(&self) -> Result<PooledConn> {
    self.pool.get().map_err(|e| DomainError::PersistenceError(format!("pool: {}", e)))
  }
}

fn decode_ids(raw: &str) -> Result<HashSet<Uuid>> {
  let ids: Vec<String> = serde_json::from_str(raw)?;
  let mut out = HashSet::with_capacity(ids.len());
  for s in ids {
    let id = Uuid::parse_str(&s).map_err(|e| DomainError::PersistenceError(format!("uuid inválido '{}': {}", s, e)))?;
    out.insert(id);
  }
  Ok(out)
}

fn encode_ids(visible: &HashSet<Uuid>) -> Result<String> {
  // Orden estable en disco para que la fila sea comparable entre saves
  let mut ids: Vec<String> = visible.iter().map(|u| u.to_string()).collect();
  ids.sort();
  Ok(serde_json::to_string(&ids)?)
}

impl VisibilityStore for DieselVisibilityStore {
  fn load(&self, user_id: &Uuid, group_id: &Uuid) -> Result<Option<HashSet<Uuid>>> {
    let mut conn = self.conn()?;
    let raw = prefs_dsl::column_preferences.filter(prefs_dsl::user_id.eq(user_id.to_string()))
                                           .filter(prefs_dsl::group_id.eq(group_id.to_string()))
                                           .select(prefs_dsl::visible_ids)
                                           .first::<String>(&mut conn)
                                           .optional()
                                           .map_err(|e| DomainError::PersistenceError(format!("db: {}", e)))?;
    raw.map(|r| decode_ids(&r)).transpose()
  }

  fn save(&self, user_id: &Uuid, group_id: &Uuid, visible: &HashSet<Uuid>) -> Result<()> {
    let mut conn = self.conn()?;
    let encoded = encode_ids(visible)?;
    let now = Utc::now().timestamp_millis();
    let user_id_s = user_id.to_string();
    let group_id_s = group_id.to_string();
    // Upsert perezoso: la fila se crea en el primer toggle
    let updated = diesel::update(prefs_dsl::column_preferences.filter(prefs_dsl::user_id.eq(&user_id_s))
                                                              .filter(prefs_dsl::group_id.eq(&group_id_s)))
                  .set((prefs_dsl::visible_ids.eq(&encoded), prefs_dsl::updated_at_ts.eq(now)))
                  .execute(&mut conn)
                  .map_err(|e| DomainError::PersistenceError(format!("db: {}", e)))?;
    if updated == 0 {
      diesel::insert_into(prefs_dsl::column_preferences)
        .values((prefs_dsl::id.eq(Uuid::new_v4().to_string()),
                 prefs_dsl::user_id.eq(&user_id_s),
                 prefs_dsl::group_id.eq(&group_id_s),
                 prefs_dsl::visible_ids.eq(&encoded),
                 prefs_dsl::updated_at_ts.eq(now)))
        .execute(&mut conn)
        .map_err(|e| DomainError::PersistenceError(format!("db: {}", e)))?;
    }
    Ok(())
  }
}
