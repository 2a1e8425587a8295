// Escenarios de extremo a extremo de la cuadrícula de comparación, tal
// como los recorrería la UI: cargar, decorar celdas, editar, guardar.
use comparison::{ComparisonEngine, ConcentrationMap, InMemoryVisibilityStore};
use formula_domain::{ConcentrationEdit, ConcentrationUnit, DomainError, FormulaRepository, InMemoryFormulaRepository,
                     Substance};
use std::sync::Arc;
use uuid::Uuid;

struct Grid {
  engine: ComparisonEngine<InMemoryFormulaRepository>,
  user: Uuid,
  group: Uuid,
  a: Uuid,
  b: Uuid,
  s1: Uuid,
  s2: Uuid,
}

// Grupo G con variaciones A (principal) y B. A tiene S1@10 g/kg; B tiene
// S1@15 y S2@5.
fn grid() -> Grid {
  let repo = Arc::new(InMemoryFormulaRepository::new());
  let user = Uuid::new_v4();
  let s1 = repo.save_substance(Substance::new("S1 vainillina").unwrap()).unwrap();
  let s2 = repo.save_substance(Substance::new("S2 linalool").unwrap()).unwrap();

  let a = repo.create_formula(&user, "Perfil A", None).unwrap();
  repo.upsert_ingredient(&user, &a.id(), &s1, 10.0, ConcentrationUnit::GramsPerKilogram).unwrap();
  let b = repo.create_variation(&user, &a.id(), "B").unwrap();
  let group = b.variation_group_id().unwrap();
  repo.bulk_update_concentrations(&user,
                                  &[ConcentrationEdit { formula_id: b.id(), substance_id: s1, concentration: 15.0 }])
      .unwrap();
  repo.upsert_ingredient(&user, &b.id(), &s2, 5.0, ConcentrationUnit::GramsPerKilogram).unwrap();

  let engine = ComparisonEngine::new(repo, Arc::new(InMemoryVisibilityStore::new()));
  Grid { engine, user, group, a: a.id(), b: b.id(), s1, s2 }
}

#[test]
fn scenario_1_grid_cells_and_decorations() {
  let g = grid();
  let data = g.engine.load_comparison_data(&g.user, &g.group).unwrap();

  let ids = data.substance_ids();
  assert_eq!(ids.len(), 2);
  assert!(ids.contains(&g.s1) && ids.contains(&g.s2));

  let map = ConcentrationMap::build(&data);
  assert_eq!(map.concentration(&g.s1, &g.a), Some(10.0));
  assert!(map.is_missing(&g.s2, &g.a));
  assert_eq!(map.concentration(&g.s1, &g.b), Some(15.0));
  assert_eq!(map.concentration(&g.s2, &g.b), Some(5.0));
  assert!(map.is_unique(&g.s2, &g.b));

  let col_b = data.variations.iter().find(|v| v.formula.id() == g.b).unwrap();
  assert_eq!(g.engine.variation_total(col_b).unwrap(), 20.0);

  // A es la variación principal por ser la fuente del grupo
  let col_a = data.variations.iter().find(|v| v.formula.id() == g.a).unwrap();
  assert!(col_a.formula.is_main_variation());
}

#[test]
fn scenario_2_pending_edit_overwrites_in_place() {
  let g = grid();
  g.engine.set_pending_edit(g.a, g.s1, 12.0).unwrap();
  g.engine.set_pending_edit(g.a, g.s1, 14.0).unwrap();
  assert_eq!(g.engine.pending_count().unwrap(), 1);

  let data = g.engine.load_comparison_data(&g.user, &g.group).unwrap();
  let map = ConcentrationMap::build(&data);
  assert_eq!(g.engine.effective_concentration(&map, &g.s1, &g.a).unwrap(), Some(14.0));
  // El valor persistido no cambió todavía
  assert_eq!(map.concentration(&g.s1, &g.a), Some(10.0));
}

#[test]
fn scenario_3_set_main_moves_the_flag() {
  let g = grid();
  g.engine.repository().set_main_variation(&g.user, &g.b).unwrap();
  let members = g.engine.repository().group_members(&g.user, &g.group).unwrap();
  for m in &members {
    assert_eq!(m.is_main_variation(), m.id() == g.b);
  }
}

#[test]
fn scenario_4_last_visible_column_stays() {
  let g = grid();
  // Ocultar B deja sólo A visible
  g.engine.toggle_column(&g.user, &g.group, &g.b).unwrap();
  let visible = g.engine.visible_columns(&g.user, &g.group).unwrap();
  assert_eq!(visible, [g.a].into_iter().collect());

  // Intentar ocultar A se rechaza y A sigue visible
  match g.engine.toggle_column(&g.user, &g.group, &g.a) {
    Err(DomainError::ValidationError(_)) => {}
    other => panic!("expected ValidationError, got {:?}", other),
  }
  let visible = g.engine.visible_columns(&g.user, &g.group).unwrap();
  assert!(visible.contains(&g.a));
}

#[test]
fn scenario_5_bulk_commit_then_reload() {
  let g = grid();
  g.engine.set_pending_edit(g.a, g.s1, 14.0).unwrap();
  g.engine.set_pending_edit(g.b, g.s2, 8.0).unwrap();
  assert_eq!(g.engine.commit_pending(&g.user).unwrap(), 2);

  let data = g.engine.load_comparison_data(&g.user, &g.group).unwrap();
  let map = ConcentrationMap::build(&data);
  assert_eq!(map.concentration(&g.s1, &g.a), Some(14.0));
  assert_eq!(map.concentration(&g.s2, &g.b), Some(8.0));
  // Tras recargar ya no hay nada pendiente
  assert!(!g.engine.has_unsaved_changes().unwrap());
}
