// Archivo: metrics.rs
// Propósito: métricas derivadas puras sobre los datos de comparación.
//
// Ninguna función de este módulo tiene efectos secundarios: todo se
// calcula sobre `ComparisonData` ya cargado más la superposición de
// ediciones pendientes.
use crate::data::{ComparisonData, VariationColumn};
use crate::pending::PendingEdits;
use std::collections::HashMap;
use uuid::Uuid;

/// Factor de holgura del deslizador sobre el máximo observado.
const SLIDER_HEADROOM: f64 = 1.5;
/// Mínimo del rango del deslizador, para no degenerar en ancho cero.
const SLIDER_FLOOR: f64 = 1.0;

/// Índice sustancia → fórmula → concentración, construido una vez por
/// pasada de render para consultas O(1).
#[derive(Debug, Clone)]
pub struct ConcentrationMap {
    inner: HashMap<Uuid, HashMap<Uuid, f64>>,
}

impl ConcentrationMap {
    pub fn build(data: &ComparisonData) -> Self {
        let mut inner: HashMap<Uuid, HashMap<Uuid, f64>> = HashMap::new();
        for column in &data.variations {
            let formula_id = column.formula.id();
            for row in &column.ingredients {
                inner.entry(row.substance_id())
                     .or_default()
                     .insert(formula_id, row.concentration());
            }
        }
        Self { inner }
    }

    /// Concentración persistida de la celda, `None` si la variación no
    /// tiene fila para esa sustancia.
    pub fn concentration(&self, substance_id: &Uuid, formula_id: &Uuid) -> Option<f64> {
        self.inner.get(substance_id).and_then(|per_formula| per_formula.get(formula_id)).copied()
    }

    /// Rango superior del deslizador para una sustancia: máximo entre
    /// todas las variaciones con holgura ×1.5, nunca por debajo de 1.
    pub fn max_concentration(&self, substance_id: &Uuid) -> f64 {
        let max = self.inner
                      .get(substance_id)
                      .map(|per_formula| per_formula.values().fold(0.0f64, |acc, c| acc.max(*c)))
                      .unwrap_or(0.0);
        (max * SLIDER_HEADROOM).max(SLIDER_FLOOR)
    }

    /// `true` si la variación no tiene fila para la sustancia. Una
    /// concentración cero explícita NO es "ausente".
    pub fn is_missing(&self, substance_id: &Uuid, formula_id: &Uuid) -> bool {
        self.concentration(substance_id, formula_id).is_none()
    }

    /// `true` si exactamente una variación contiene la sustancia y es
    /// esta. Señala los ingredientes diferenciadores de la columna.
    pub fn is_unique(&self, substance_id: &Uuid, formula_id: &Uuid) -> bool {
        match self.inner.get(substance_id) {
            Some(per_formula) => per_formula.len() == 1 && per_formula.contains_key(formula_id),
            None => false,
        }
    }
}

/// Total de una variación: suma de concentraciones efectivas (pendiente
/// si existe, persistida si no) de sus propias filas.
pub fn variation_total(column: &VariationColumn, pending: &PendingEdits) -> f64 {
    let formula_id = column.formula.id();
    column.ingredients
          .iter()
          .map(|row| pending.get(&formula_id, &row.substance_id()).unwrap_or_else(|| row.concentration()))
          .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use formula_domain::{ConcentrationUnit, Formula, FormulaIngredient, Substance, VariationGroup};

    fn column(owner: Uuid, group: Uuid, label: &str, rows: &[(Uuid, f64)]) -> VariationColumn {
        let formula = Formula::new(owner, "base").unwrap().with_variation(group, Some(label.into()), false);
        let ingredients = rows.iter()
                              .enumerate()
                              .map(|(pos, (sid, c))| {
                                  FormulaIngredient::new(formula.id(), *sid, *c, ConcentrationUnit::default(), pos as i32)
                                      .unwrap()
                              })
                              .collect();
        VariationColumn { formula, ingredients }
    }

    fn data_with(columns: Vec<VariationColumn>, substances: Vec<Substance>) -> ComparisonData {
        let owner = columns[0].formula.owner_id();
        ComparisonData { group: VariationGroup::new(owner, "grupo").unwrap(),
                         variations: columns,
                         all_substances: substances }
    }

    #[test]
    fn missing_is_distinct_from_zero() {
        let owner = Uuid::new_v4();
        let group = Uuid::new_v4();
        let s1 = Substance::new("Vainillina").unwrap();
        let a = column(owner, group, "A", &[(s1.id(), 0.0)]);
        let b = column(owner, group, "B", &[]);
        let a_id = a.formula.id();
        let b_id = b.formula.id();
        let data = data_with(vec![a, b], vec![s1.clone()]);
        let map = ConcentrationMap::build(&data);

        assert!(!map.is_missing(&s1.id(), &a_id));
        assert_eq!(map.concentration(&s1.id(), &a_id), Some(0.0));
        assert!(map.is_missing(&s1.id(), &b_id));
        assert_eq!(map.concentration(&s1.id(), &b_id), None);
    }

    #[test]
    fn unique_flags_the_only_holder() {
        let owner = Uuid::new_v4();
        let group = Uuid::new_v4();
        let s1 = Substance::new("Vainillina").unwrap();
        let s2 = Substance::new("Linalool").unwrap();
        let a = column(owner, group, "A", &[(s1.id(), 10.0)]);
        let b = column(owner, group, "B", &[(s1.id(), 15.0), (s2.id(), 5.0)]);
        let a_id = a.formula.id();
        let b_id = b.formula.id();
        let data = data_with(vec![a, b], vec![s1.clone(), s2.clone()]);
        let map = ConcentrationMap::build(&data);

        assert!(map.is_unique(&s2.id(), &b_id));
        assert!(!map.is_unique(&s2.id(), &a_id));
        assert!(!map.is_unique(&s1.id(), &a_id));
        assert!(!map.is_unique(&s1.id(), &b_id));
    }

    #[test]
    fn slider_range_has_headroom_and_floor() {
        let owner = Uuid::new_v4();
        let group = Uuid::new_v4();
        let s1 = Substance::new("Vainillina").unwrap();
        let s2 = Substance::new("Linalool").unwrap();
        let a = column(owner, group, "A", &[(s1.id(), 10.0), (s2.id(), 0.1)]);
        let data = data_with(vec![a], vec![s1.clone(), s2.clone()]);
        let map = ConcentrationMap::build(&data);

        assert_eq!(map.max_concentration(&s1.id()), 15.0);
        // Máximos pequeños quedan en el suelo de 1
        assert_eq!(map.max_concentration(&s2.id()), 1.0);
        // Sustancia sin filas: también el suelo
        assert_eq!(map.max_concentration(&Uuid::new_v4()), 1.0);
    }

    #[test]
    fn totals_are_pending_aware() {
        let owner = Uuid::new_v4();
        let group = Uuid::new_v4();
        let s1 = Substance::new("Vainillina").unwrap();
        let s2 = Substance::new("Linalool").unwrap();
        let b = column(owner, group, "B", &[(s1.id(), 15.0), (s2.id(), 5.0)]);
        let b_id = b.formula.id();

        let mut pending = PendingEdits::new();
        assert_eq!(variation_total(&b, &pending), 20.0);
        pending.set(b_id, s2.id(), 8.0);
        assert_eq!(variation_total(&b, &pending), 23.0);
    }
}
