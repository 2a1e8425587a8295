// Archivo: visibility.rs
// Propósito: política de visibilidad de columnas por (usuario, grupo).
//
// La política vive aquí; la tecnología de almacenamiento queda detrás del
// trait `VisibilityStore` (en memoria para pruebas, tabla de preferencias
// en la persistencia Diesel).
use formula_domain::{DomainError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

/// Contrato de almacenamiento de preferencias de visibilidad.
///
/// `load` devuelve `None` cuando el usuario nunca ha tocado la
/// visibilidad del grupo (primer uso): la política lo interpreta como
/// "todas las columnas visibles".
pub trait VisibilityStore: Send + Sync {
    fn load(&self, user_id: &Uuid, group_id: &Uuid) -> Result<Option<HashSet<Uuid>>>;
    fn save(&self, user_id: &Uuid, group_id: &Uuid, visible: &HashSet<Uuid>) -> Result<()>;
}

/// Conjunto visible efectivo para un grupo.
///
/// Reglas:
/// - sin preferencia guardada → todos los miembros visibles;
/// - ids guardados que ya no son miembros se descartan;
/// - si el filtrado deja el conjunto vacío (todas las columnas guardadas
///   fueron eliminadas) se vuelve al valor por defecto "todas".
pub fn visible_columns<S: VisibilityStore + ?Sized>(store: &S,
                                                    user_id: &Uuid,
                                                    group_id: &Uuid,
                                                    all_member_ids: &[Uuid])
                                                    -> Result<HashSet<Uuid>> {
    let all: HashSet<Uuid> = all_member_ids.iter().copied().collect();
    match store.load(user_id, group_id)? {
        Some(stored) => {
            let filtered: HashSet<Uuid> = stored.intersection(&all).copied().collect();
            if filtered.is_empty() {
                Ok(all)
            } else {
                Ok(filtered)
            }
        }
        None => Ok(all),
    }
}

/// Alterna la visibilidad de una columna y persiste el resultado.
///
/// Invariante: la última columna visible no puede ocultarse; el intento
/// se rechaza con `ValidationError` y el conjunto queda intacto.
pub fn toggle_column<S: VisibilityStore + ?Sized>(store: &S,
                                                  user_id: &Uuid,
                                                  group_id: &Uuid,
                                                  formula_id: &Uuid,
                                                  all_member_ids: &[Uuid])
                                                  -> Result<HashSet<Uuid>> {
    if !all_member_ids.contains(formula_id) {
        return Err(DomainError::NotFound(format!("la fórmula {} no es miembro del grupo {}", formula_id, group_id)));
    }
    let mut visible = visible_columns(store, user_id, group_id, all_member_ids)?;
    if visible.contains(formula_id) {
        if visible.len() == 1 {
            return Err(DomainError::ValidationError("No se puede ocultar la última columna visible".to_string()));
        }
        visible.remove(formula_id);
    } else {
        visible.insert(*formula_id);
    }
    store.save(user_id, group_id, &visible)?;
    Ok(visible)
}

/// Almacén de preferencias en memoria para pruebas y wiring rápido.
pub struct InMemoryVisibilityStore {
    /// Mapa (user_id, group_id) -> ids visibles
    prefs: Mutex<HashMap<(Uuid, Uuid), HashSet<Uuid>>>,
}

impl InMemoryVisibilityStore {
    pub fn new() -> Self {
        Self { prefs: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryVisibilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityStore for InMemoryVisibilityStore {
    fn load(&self, user_id: &Uuid, group_id: &Uuid) -> Result<Option<HashSet<Uuid>>> {
        let prefs = self.prefs
                        .lock()
                        .map_err(|e| DomainError::PersistenceError(format!("mutex poisoned: {:?}", e)))?;
        Ok(prefs.get(&(*user_id, *group_id)).cloned())
    }

    fn save(&self, user_id: &Uuid, group_id: &Uuid, visible: &HashSet<Uuid>) -> Result<()> {
        let mut prefs = self.prefs
                            .lock()
                            .map_err(|e| DomainError::PersistenceError(format!("mutex poisoned: {:?}", e)))?;
        prefs.insert((*user_id, *group_id), visible.clone());
        Ok(())
    }
}
