// Archivo: data.rs
// Propósito: DTOs que el cargador entrega a la cuadrícula de comparación.
use formula_domain::{Formula, FormulaIngredient, Substance, VariationGroup};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Una columna de la cuadrícula: un miembro del grupo con sus filas de
/// ingredientes ya cargadas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationColumn {
    pub formula: Formula,
    pub ingredients: Vec<FormulaIngredient>,
}

impl VariationColumn {
    /// Concentración persistida de una sustancia en esta variación, o
    /// `None` si la sustancia no aparece (distinto de cero explícito).
    pub fn concentration_of(&self, substance_id: &Uuid) -> Option<f64> {
        self.ingredients
            .iter()
            .find(|i| i.substance_id() == *substance_id)
            .map(|i| i.concentration())
    }
}

/// Resultado completo del cargador para un grupo.
///
/// `all_substances` es la unión deduplicada de las sustancias usadas en
/// cualquier miembro, en orden determinista (nombre, luego id): es el eje
/// de filas de la cuadrícula. Que no toda sustancia aparezca en toda
/// variación es lo esperado, no un error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonData {
    pub group: VariationGroup,
    pub variations: Vec<VariationColumn>,
    pub all_substances: Vec<Substance>,
}

impl ComparisonData {
    /// Ids de los miembros, en el orden de columnas.
    pub fn member_ids(&self) -> Vec<Uuid> {
        self.variations.iter().map(|v| v.formula.id()).collect()
    }

    pub fn substance_ids(&self) -> Vec<Uuid> {
        self.all_substances.iter().map(|s| s.id()).collect()
    }
}
