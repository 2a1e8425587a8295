use crate::{ConcentrationEdit, ConcentrationUnit, DomainError, Formula, FormulaIngredient, Substance, VariationGroup};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Trait que define la persistencia del dominio de formulación.
///
/// Todas las operaciones que mutan reciben `caller` (id del usuario que
/// llama) y verifican propiedad antes de tocar nada: `NotFound` si el
/// objetivo no existe, `Unauthorized` si existe pero pertenece a otro
/// usuario.
pub trait FormulaRepository: Send + Sync {
    /// Guarda una sustancia de catálogo y devuelve su id.
    fn save_substance(&self, substance: Substance) -> Result<Uuid, DomainError>;

    /// Recupera una sustancia por id.
    fn get_substance(&self, id: &Uuid) -> Result<Option<Substance>, DomainError>;

    /// Recupera varias sustancias, en el orden de los ids pedidos.
    /// `NotFound` si falta alguna: el catálogo debe ser consistente con
    /// las filas de ingredientes que lo referencian.
    fn substances_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Substance>, DomainError>;

    /// Lista el catálogo completo, ordenado por nombre.
    fn list_substances(&self) -> Result<Vec<Substance>, DomainError>;

    /// Crea una fórmula vacía para el llamante.
    fn create_formula(&self, caller: &Uuid, name: &str, description: Option<String>) -> Result<Formula, DomainError>;

    /// Recupera una fórmula del llamante.
    fn get_formula(&self, caller: &Uuid, formula_id: &Uuid) -> Result<Formula, DomainError>;

    /// Inserta o reemplaza la fila (sustancia, fórmula). A lo sumo una fila
    /// por par: si ya existe, gana la escritura nueva.
    fn upsert_ingredient(&self,
                         caller: &Uuid,
                         formula_id: &Uuid,
                         substance_id: &Uuid,
                         concentration: f64,
                         unit: ConcentrationUnit)
                         -> Result<(), DomainError>;

    /// Filas de ingredientes de una fórmula del llamante, ordenadas por
    /// posición.
    fn ingredients_of(&self, caller: &Uuid, formula_id: &Uuid) -> Result<Vec<FormulaIngredient>, DomainError>;

    /// Crea una variación a partir de una fórmula fuente.
    ///
    /// Si la fuente no tiene grupo, crea uno (con el nombre de la fuente),
    /// marca la fuente como variación principal y añade una copia profunda
    /// (sustancias incluidas) como nuevo miembro. Si ya tiene grupo, sólo
    /// añade la copia. `DuplicateLabel` si la etiqueta choca dentro del
    /// grupo.
    fn create_variation(&self, caller: &Uuid, source_formula_id: &Uuid, label: &str) -> Result<Formula, DomainError>;

    /// Marca la fórmula como variación principal de su grupo, limpiando el
    /// flag en el resto de miembros en la misma operación. Idempotente.
    /// `NotFound` si la fórmula no pertenece a ningún grupo.
    fn set_main_variation(&self, caller: &Uuid, formula_id: &Uuid) -> Result<(), DomainError>;

    /// Actualiza etiqueta y/o descripción de un único miembro.
    fn update_variation_details(&self,
                                caller: &Uuid,
                                formula_id: &Uuid,
                                label: Option<String>,
                                description: Option<String>)
                                -> Result<Formula, DomainError>;

    /// Copia la descripción del miembro fuente al resto de miembros del
    /// grupo. Sólo efecto secundario.
    fn sync_variation_descriptions(&self, caller: &Uuid, source_formula_id: &Uuid) -> Result<(), DomainError>;

    /// Elimina un miembro del grupo (con sus filas de ingredientes). Si era
    /// la variación principal, promueve al miembro superviviente más
    /// antiguo; si era el último, disuelve el grupo.
    fn delete_variation(&self, caller: &Uuid, formula_id: &Uuid) -> Result<(), DomainError>;

    /// Recupera un grupo del llamante.
    fn get_group(&self, caller: &Uuid, group_id: &Uuid) -> Result<VariationGroup, DomainError>;

    /// Grupos del llamante, ordenados por fecha de creación.
    fn list_groups(&self, caller: &Uuid) -> Result<Vec<VariationGroup>, DomainError>;

    /// Miembros del grupo, orden estable por fecha de creación (empates por
    /// id) para que la cuadrícula no baile entre recargas.
    fn group_members(&self, caller: &Uuid, group_id: &Uuid) -> Result<Vec<Formula>, DomainError>;

    /// Aplica todas las ediciones en una sola llamada, todo-o-nada: si
    /// alguna fila no existe o no es del llamante no se escribe ninguna.
    fn bulk_update_concentrations(&self, caller: &Uuid, edits: &[ConcentrationEdit]) -> Result<(), DomainError>;

    /// Purga de cuenta: elimina grupos, fórmulas y filas de ingredientes
    /// del usuario.
    fn purge_user_data(&self, user_id: &Uuid) -> Result<(), DomainError>;
}

/// Implementación en memoria para tests y desarrollo.
pub struct InMemoryFormulaRepository {
    substances: Arc<Mutex<HashMap<Uuid, Substance>>>,
    formulas: Arc<Mutex<HashMap<Uuid, Formula>>>,
    groups: Arc<Mutex<HashMap<Uuid, VariationGroup>>>,
    /// Filas de ingredientes indexadas por (formula_id, substance_id).
    ingredients: Arc<Mutex<HashMap<(Uuid, Uuid), FormulaIngredient>>>,
}

impl InMemoryFormulaRepository {
    pub fn new() -> Self {
        Self { substances: Arc::new(Mutex::new(HashMap::new())),
               formulas: Arc::new(Mutex::new(HashMap::new())),
               groups: Arc::new(Mutex::new(HashMap::new())),
               ingredients: Arc::new(Mutex::new(HashMap::new())) }
    }

    // Helper to map poisoned mutex errors into DomainError
    fn lock_map<'a, T>(&'a self, m: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, DomainError> {
        m.lock()
         .map_err(|e| DomainError::PersistenceError(format!("Mutex '{}' poisoned: {}", name, e)))
    }

    fn owned_formula(map: &HashMap<Uuid, Formula>, caller: &Uuid, id: &Uuid) -> Result<Formula, DomainError> {
        let f = map.get(id).ok_or(DomainError::NotFound(format!("fórmula {}", id)))?;
        if f.owner_id() != *caller {
            return Err(DomainError::Unauthorized(format!("fórmula {}", id)));
        }
        Ok(f.clone())
    }

    fn members_sorted(map: &HashMap<Uuid, Formula>, group_id: &Uuid) -> Vec<Formula> {
        let mut members: Vec<Formula> = map.values()
                                           .filter(|f| f.variation_group_id() == Some(*group_id))
                                           .cloned()
                                           .collect();
        members.sort_by_key(|f| (f.created_at(), f.id()));
        members
    }
}

impl Default for InMemoryFormulaRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulaRepository for InMemoryFormulaRepository {
    fn save_substance(&self, substance: Substance) -> Result<Uuid, DomainError> {
        let id = substance.id();
        self.lock_map(&self.substances, "substances")?.insert(id, substance);
        Ok(id)
    }

    fn get_substance(&self, id: &Uuid) -> Result<Option<Substance>, DomainError> {
        let subs = self.lock_map(&self.substances, "substances")?;
        Ok(subs.get(id).cloned())
    }

    fn substances_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Substance>, DomainError> {
        let subs = self.lock_map(&self.substances, "substances")?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let s = subs.get(id).ok_or(DomainError::NotFound(format!("sustancia {}", id)))?;
            out.push(s.clone());
        }
        Ok(out)
    }

    fn list_substances(&self) -> Result<Vec<Substance>, DomainError> {
        let subs = self.lock_map(&self.substances, "substances")?;
        let mut out: Vec<Substance> = subs.values().cloned().collect();
        out.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
        Ok(out)
    }

    fn create_formula(&self, caller: &Uuid, name: &str, description: Option<String>) -> Result<Formula, DomainError> {
        let formula = Formula::new(*caller, name)?.with_description(description);
        self.lock_map(&self.formulas, "formulas")?.insert(formula.id(), formula.clone());
        Ok(formula)
    }

    fn get_formula(&self, caller: &Uuid, formula_id: &Uuid) -> Result<Formula, DomainError> {
        let formulas = self.lock_map(&self.formulas, "formulas")?;
        Self::owned_formula(&formulas, caller, formula_id)
    }

    fn upsert_ingredient(&self,
                         caller: &Uuid,
                         formula_id: &Uuid,
                         substance_id: &Uuid,
                         concentration: f64,
                         unit: ConcentrationUnit)
                         -> Result<(), DomainError> {
        {
            let subs = self.lock_map(&self.substances, "substances")?;
            if !subs.contains_key(substance_id) {
                return Err(DomainError::NotFound(format!("sustancia {}", substance_id)));
            }
        }
        let formulas = self.lock_map(&self.formulas, "formulas")?;
        Self::owned_formula(&formulas, caller, formula_id)?;
        drop(formulas);

        let mut rows = self.lock_map(&self.ingredients, "ingredients")?;
        let key = (*formula_id, *substance_id);
        if let Some(existing) = rows.get(&key) {
            let updated = existing.with_concentration(concentration)?;
            rows.insert(key, updated);
        } else {
            let position = rows.values()
                               .filter(|i| i.formula_id() == *formula_id)
                               .map(|i| i.position())
                               .max()
                               .map(|p| p + 1)
                               .unwrap_or(0);
            let row = FormulaIngredient::new(*formula_id, *substance_id, concentration, unit, position)?;
            rows.insert(key, row);
        }
        Ok(())
    }

    fn ingredients_of(&self, caller: &Uuid, formula_id: &Uuid) -> Result<Vec<FormulaIngredient>, DomainError> {
        let formulas = self.lock_map(&self.formulas, "formulas")?;
        Self::owned_formula(&formulas, caller, formula_id)?;
        drop(formulas);

        let rows = self.lock_map(&self.ingredients, "ingredients")?;
        let mut out: Vec<FormulaIngredient> =
            rows.values().filter(|i| i.formula_id() == *formula_id).cloned().collect();
        out.sort_by_key(|i| (i.position(), i.substance_id()));
        Ok(out)
    }

    fn create_variation(&self, caller: &Uuid, source_formula_id: &Uuid, label: &str) -> Result<Formula, DomainError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(DomainError::ValidationError("La etiqueta de la variación no puede estar vacía".to_string()));
        }

        let mut formulas = self.lock_map(&self.formulas, "formulas")?;
        let source = Self::owned_formula(&formulas, caller, source_formula_id)?;

        // Primera variación: crear el grupo y marcar la fuente como principal
        let group_id = match source.variation_group_id() {
            Some(g) => g,
            None => {
                let group = VariationGroup::new(*caller, source.name())?;
                let gid = group.id();
                self.lock_map(&self.groups, "groups")?.insert(gid, group);
                let promoted = source.with_variation(gid, None, true);
                formulas.insert(promoted.id(), promoted);
                gid
            }
        };

        for member in Self::members_sorted(&formulas, &group_id) {
            if member.variation_label() == Some(label) {
                return Err(DomainError::DuplicateLabel(label.to_string()));
            }
        }

        let copy = Formula::new(*caller, source.name())?
            .with_description(source.description().map(|s| s.to_string()))
            .with_variation(group_id, Some(label.to_string()), false);

        // Copia profunda de las filas de ingredientes de la fuente
        let mut rows = self.lock_map(&self.ingredients, "ingredients")?;
        let copied: Vec<FormulaIngredient> = rows.values()
                                                 .filter(|i| i.formula_id() == *source_formula_id)
                                                 .map(|i| {
                                                     FormulaIngredient::new(copy.id(),
                                                                            i.substance_id(),
                                                                            i.concentration(),
                                                                            i.unit(),
                                                                            i.position())
                                                 })
                                                 .collect::<Result<_, _>>()?;
        for row in copied {
            rows.insert((row.formula_id(), row.substance_id()), row);
        }
        formulas.insert(copy.id(), copy.clone());
        Ok(copy)
    }

    fn set_main_variation(&self, caller: &Uuid, formula_id: &Uuid) -> Result<(), DomainError> {
        let mut formulas = self.lock_map(&self.formulas, "formulas")?;
        let target = Self::owned_formula(&formulas, caller, formula_id)?;
        let group_id = target.variation_group_id()
                             .ok_or(DomainError::NotFound(format!("la fórmula {} no pertenece a un grupo", formula_id)))?;

        for member in Self::members_sorted(&formulas, &group_id) {
            let updated = member.with_main(member.id() == *formula_id);
            formulas.insert(updated.id(), updated);
        }
        Ok(())
    }

    fn update_variation_details(&self,
                                caller: &Uuid,
                                formula_id: &Uuid,
                                label: Option<String>,
                                description: Option<String>)
                                -> Result<Formula, DomainError> {
        let mut formulas = self.lock_map(&self.formulas, "formulas")?;
        let mut formula = Self::owned_formula(&formulas, caller, formula_id)?;
        if let Some(l) = label {
            if l.trim().is_empty() {
                return Err(DomainError::ValidationError("La etiqueta de la variación no puede estar vacía".to_string()));
            }
            formula = formula.with_label(l.trim().to_string());
        }
        if let Some(d) = description {
            formula = formula.with_description(Some(d));
        }
        formulas.insert(formula.id(), formula.clone());
        Ok(formula)
    }

    fn sync_variation_descriptions(&self, caller: &Uuid, source_formula_id: &Uuid) -> Result<(), DomainError> {
        let mut formulas = self.lock_map(&self.formulas, "formulas")?;
        let source = Self::owned_formula(&formulas, caller, source_formula_id)?;
        let group_id = source.variation_group_id()
                             .ok_or(DomainError::NotFound(format!("la fórmula {} no pertenece a un grupo",
                                                                  source_formula_id)))?;
        let description = source.description().map(|s| s.to_string());
        for member in Self::members_sorted(&formulas, &group_id) {
            if member.id() == *source_formula_id {
                continue;
            }
            let updated = member.with_description(description.clone());
            formulas.insert(updated.id(), updated);
        }
        Ok(())
    }

    fn delete_variation(&self, caller: &Uuid, formula_id: &Uuid) -> Result<(), DomainError> {
        let mut formulas = self.lock_map(&self.formulas, "formulas")?;
        let target = Self::owned_formula(&formulas, caller, formula_id)?;
        let group_id = target.variation_group_id()
                             .ok_or(DomainError::NotFound(format!("la fórmula {} no pertenece a un grupo", formula_id)))?;
        let was_main = target.is_main_variation();

        formulas.remove(formula_id);
        let mut rows = self.lock_map(&self.ingredients, "ingredients")?;
        rows.retain(|(f, _), _| f != formula_id);
        drop(rows);

        let survivors = Self::members_sorted(&formulas, &group_id);
        if survivors.is_empty() {
            self.lock_map(&self.groups, "groups")?.remove(&group_id);
        } else if was_main {
            // Promueve al miembro más antiguo para conservar el invariante
            let heir = survivors[0].with_main(true);
            formulas.insert(heir.id(), heir);
        }
        Ok(())
    }

    fn get_group(&self, caller: &Uuid, group_id: &Uuid) -> Result<VariationGroup, DomainError> {
        let groups = self.lock_map(&self.groups, "groups")?;
        let g = groups.get(group_id).ok_or(DomainError::NotFound(format!("grupo {}", group_id)))?;
        if g.owner_id() != *caller {
            return Err(DomainError::Unauthorized(format!("grupo {}", group_id)));
        }
        Ok(g.clone())
    }

    fn list_groups(&self, caller: &Uuid) -> Result<Vec<VariationGroup>, DomainError> {
        let groups = self.lock_map(&self.groups, "groups")?;
        let mut out: Vec<VariationGroup> = groups.values().filter(|g| g.owner_id() == *caller).cloned().collect();
        out.sort_by_key(|g| (g.created_at(), g.id()));
        Ok(out)
    }

    fn group_members(&self, caller: &Uuid, group_id: &Uuid) -> Result<Vec<Formula>, DomainError> {
        self.get_group(caller, group_id)?;
        let formulas = self.lock_map(&self.formulas, "formulas")?;
        Ok(Self::members_sorted(&formulas, group_id))
    }

    fn bulk_update_concentrations(&self, caller: &Uuid, edits: &[ConcentrationEdit]) -> Result<(), DomainError> {
        // Validar todo antes de escribir nada: todo-o-nada
        for e in edits {
            e.validate()?;
        }
        let formulas = self.lock_map(&self.formulas, "formulas")?;
        for e in edits {
            Self::owned_formula(&formulas, caller, &e.formula_id)?;
        }
        drop(formulas);

        let mut rows = self.lock_map(&self.ingredients, "ingredients")?;
        for e in edits {
            let key = (e.formula_id, e.substance_id);
            if !rows.contains_key(&key) {
                return Err(DomainError::NotFound(format!("fila ({}, {})", e.substance_id, e.formula_id)));
            }
        }
        for e in edits {
            let key = (e.formula_id, e.substance_id);
            if let Some(existing) = rows.get(&key) {
                let updated = existing.with_concentration(e.concentration)?;
                rows.insert(key, updated);
            }
        }
        Ok(())
    }

    fn purge_user_data(&self, user_id: &Uuid) -> Result<(), DomainError> {
        let mut formulas = self.lock_map(&self.formulas, "formulas")?;
        let doomed: Vec<Uuid> = formulas.values()
                                        .filter(|f| f.owner_id() == *user_id)
                                        .map(|f| f.id())
                                        .collect();
        for id in &doomed {
            formulas.remove(id);
        }
        drop(formulas);

        let mut rows = self.lock_map(&self.ingredients, "ingredients")?;
        rows.retain(|(f, _), _| !doomed.contains(f));
        drop(rows);

        let mut groups = self.lock_map(&self.groups, "groups")?;
        groups.retain(|_, g| g.owner_id() != *user_id);
        Ok(())
    }
}
