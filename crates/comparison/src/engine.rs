// Archivo: engine.rs
// Propósito: fachada del motor de comparación.
//
// Orquesta el ciclo cargar → editar → confirmar → recargar contra un
// `FormulaRepository` inyectado, manteniendo el acumulador de ediciones
// pendientes de la sesión. No renderiza nada: entrega datos y métricas a
// la capa de UI que tenga delante.
use crate::data::{ComparisonData, VariationColumn};
use crate::metrics::{variation_total, ConcentrationMap};
use crate::pending::PendingEdits;
use crate::visibility::{self, VisibilityStore};
use formula_domain::{DomainError, FormulaRepository, Result};
use indexmap::IndexSet;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Motor de comparación de variaciones.
///
/// Notas de modelo:
/// - Sesión de un solo usuario: el acumulador es estado en memoria del
///   motor y muere con él; no hay recuperación ante caídas.
/// - Dos commits no pueden competir desde el mismo cliente: el candado
///   del acumulador se mantiene durante todo el commit, así que un
///   segundo intento espera al primero.
pub struct ComparisonEngine<R>
    where R: FormulaRepository
{
    repo: Arc<R>,
    visibility: Arc<dyn VisibilityStore>,
    pending: Mutex<PendingEdits>,
}

impl<R> ComparisonEngine<R> where R: FormulaRepository
{
    pub fn new(repo: Arc<R>, visibility: Arc<dyn VisibilityStore>) -> Self {
        Self { repo, visibility, pending: Mutex::new(PendingEdits::new()) }
    }

    fn pending_guard(&self) -> Result<MutexGuard<'_, PendingEdits>> {
        self.pending
            .lock()
            .map_err(|e| DomainError::PersistenceError(format!("mutex poisoned: {:?}", e)))
    }

    /// Carga el grupo completo: miembros con sus filas de ingredientes y
    /// la unión deduplicada de sustancias como eje de filas.
    ///
    /// El orden de `all_substances` es determinista (nombre, empates por
    /// id) para que la cuadrícula no se reordene tras guardar. Variaciones
    /// con conjuntos de sustancias disjuntos son lo esperado.
    pub fn load_comparison_data(&self, caller: &Uuid, group_id: &Uuid) -> Result<ComparisonData> {
        let group = self.repo.get_group(caller, group_id)?;
        let members = self.repo.group_members(caller, group_id)?;

        let mut variations = Vec::with_capacity(members.len());
        let mut union: IndexSet<Uuid> = IndexSet::new();
        for member in members {
            let ingredients = self.repo.ingredients_of(caller, &member.id())?;
            for row in &ingredients {
                union.insert(row.substance_id());
            }
            variations.push(VariationColumn { formula: member, ingredients });
        }

        let ids: Vec<Uuid> = union.into_iter().collect();
        let mut all_substances = self.repo.substances_by_ids(&ids)?;
        all_substances.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));

        debug!("comparación cargada: grupo {} con {} variaciones y {} sustancias",
               group_id,
               variations.len(),
               all_substances.len());
        Ok(ComparisonData { group, variations, all_substances })
    }

    /// Registra una edición pendiente para la celda (sobrescribe la
    /// anterior de la misma celda, si la hay).
    pub fn set_pending_edit(&self, formula_id: Uuid, substance_id: Uuid, concentration: f64) -> Result<()> {
        self.pending_guard()?.set(formula_id, substance_id, concentration);
        Ok(())
    }

    /// Valor efectivo de una celda: pendiente ?? persistido; `None` si la
    /// sustancia no aparece en esa variación.
    pub fn effective_concentration(&self, map: &ConcentrationMap, substance_id: &Uuid, formula_id: &Uuid) -> Result<Option<f64>> {
        Ok(self.pending_guard()?.effective_concentration(map, substance_id, formula_id))
    }

    /// Total (consciente de pendientes) de una columna.
    pub fn variation_total(&self, column: &VariationColumn) -> Result<f64> {
        let pending = self.pending_guard()?;
        Ok(variation_total(column, &pending))
    }

    /// Número de celdas con cambios sin guardar.
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.pending_guard()?.len())
    }

    /// Flag "hay cambios sin guardar" que habilita el botón de guardado.
    pub fn has_unsaved_changes(&self) -> Result<bool> {
        Ok(!self.pending_guard()?.is_empty())
    }

    /// Descarta las ediciones pendientes sin confirmarlas (equivalente a
    /// navegar fuera de la vista).
    pub fn discard_pending(&self) -> Result<()> {
        self.pending_guard()?.clear();
        Ok(())
    }

    /// Confirma el lote acumulado en una sola llamada, todo-o-nada.
    ///
    /// Con éxito limpia el acumulador y devuelve cuántas celdas se
    /// escribieron; si el repositorio falla, el acumulador queda intacto y
    /// el error sube tal cual para que la UI lo muestre y el usuario
    /// reintente.
    pub fn commit_pending(&self, caller: &Uuid) -> Result<usize> {
        let mut pending = self.pending_guard()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let edits = pending.as_edits();
        self.repo.bulk_update_concentrations(caller, &edits)?;
        let written = edits.len();
        pending.clear();
        info!("commit de comparación: {} celdas escritas", written);
        Ok(written)
    }

    /// Columnas visibles del grupo para el llamante (por defecto todas).
    pub fn visible_columns(&self, caller: &Uuid, group_id: &Uuid) -> Result<HashSet<Uuid>> {
        let member_ids: Vec<Uuid> = self.repo.group_members(caller, group_id)?.iter().map(|m| m.id()).collect();
        visibility::visible_columns(self.visibility.as_ref(), caller, group_id, &member_ids)
    }

    /// Alterna la visibilidad de una columna respetando el invariante de
    /// "al menos una visible".
    pub fn toggle_column(&self, caller: &Uuid, group_id: &Uuid, formula_id: &Uuid) -> Result<HashSet<Uuid>> {
        let member_ids: Vec<Uuid> = self.repo.group_members(caller, group_id)?.iter().map(|m| m.id()).collect();
        visibility::toggle_column(self.visibility.as_ref(), caller, group_id, formula_id, &member_ids)
    }

    /// Acceso al repositorio inyectado (para operaciones de grupo que no
    /// pasan por el acumulador: crear variación, marcar principal, etc.).
    pub fn repository(&self) -> &R {
        &self.repo
    }
}
