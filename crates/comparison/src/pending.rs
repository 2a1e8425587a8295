// Archivo: pending.rs
// Propósito: acumulador de ediciones de concentración sin confirmar.
//
// Vive sólo en memoria, en la sesión abierta: se descarta al navegar o
// recargar y se limpia únicamente tras un commit exitoso.
use crate::metrics::ConcentrationMap;
use formula_domain::ConcentrationEdit;
use indexmap::IndexMap;
use uuid::Uuid;

/// Ediciones pendientes indexadas por (formula_id, substance_id).
///
/// Entradas repetidas para la misma clave se sobreescriben en el sitio:
/// gana el último valor, y el tamaño reportado cuenta claves distintas,
/// no interacciones. El orden de inserción se conserva para que el commit
/// aplique las ediciones en el orden en que el usuario las hizo.
#[derive(Debug, Default)]
pub struct PendingEdits {
    edits: IndexMap<(Uuid, Uuid), f64>,
}

impl PendingEdits {
    pub fn new() -> Self {
        Self { edits: IndexMap::new() }
    }

    /// Inserta o sobreescribe la edición de la celda. No valida más allá
    /// de lo que ya impone el control de entrada.
    pub fn set(&mut self, formula_id: Uuid, substance_id: Uuid, concentration: f64) {
        self.edits.insert((formula_id, substance_id), concentration);
    }

    /// Valor pendiente para la celda, si existe.
    pub fn get(&self, formula_id: &Uuid, substance_id: &Uuid) -> Option<f64> {
        self.edits.get(&(*formula_id, *substance_id)).copied()
    }

    /// Valor efectivo de la celda: el pendiente si existe, si no el
    /// persistido; `None` sólo cuando la sustancia no aparece en esa
    /// variación (distinto de un cero explícito).
    pub fn effective_concentration(&self, map: &ConcentrationMap, substance_id: &Uuid, formula_id: &Uuid) -> Option<f64> {
        self.get(formula_id, substance_id)
            .or_else(|| map.concentration(substance_id, formula_id))
    }

    /// Número de claves distintas acumuladas.
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Se invoca tras un commit exitoso; un fallo deja el acumulador tal
    /// cual para que el usuario reintente.
    pub fn clear(&mut self) {
        self.edits.clear();
    }

    /// Materializa las ediciones como lote para el committer, en orden de
    /// inserción.
    pub fn as_edits(&self) -> Vec<ConcentrationEdit> {
        self.edits
            .iter()
            .map(|((formula_id, substance_id), concentration)| ConcentrationEdit { formula_id: *formula_id,
                                                                                   substance_id: *substance_id,
                                                                                   concentration: *concentration })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_per_key() {
        let mut pending = PendingEdits::new();
        let f = Uuid::new_v4();
        let s = Uuid::new_v4();
        pending.set(f, s, 12.0);
        pending.set(f, s, 14.0);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get(&f, &s), Some(14.0));
    }

    #[test]
    fn len_counts_distinct_keys() {
        let mut pending = PendingEdits::new();
        let f = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        pending.set(f, s1, 1.0);
        pending.set(f, s2, 2.0);
        pending.set(f, s1, 3.0);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn as_edits_preserves_insertion_order() {
        let mut pending = PendingEdits::new();
        let f = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        pending.set(f, s1, 1.0);
        pending.set(f, s2, 2.0);
        pending.set(f, s1, 3.0);
        let edits = pending.as_edits();
        assert_eq!(edits.len(), 2);
        // s1 conserva su posición original aunque se haya reescrito
        assert_eq!(edits[0].substance_id, s1);
        assert_eq!(edits[0].concentration, 3.0);
        assert_eq!(edits[1].substance_id, s2);
    }

    #[test]
    fn clear_empties_the_accumulator() {
        let mut pending = PendingEdits::new();
        pending.set(Uuid::new_v4(), Uuid::new_v4(), 5.0);
        assert!(!pending.is_empty());
        pending.clear();
        assert!(pending.is_empty());
        assert_eq!(pending.len(), 0);
    }
}
