use comparison::{ComparisonEngine, ConcentrationMap, InMemoryVisibilityStore};
use formula_domain::{ConcentrationUnit, DomainError, FormulaRepository, InMemoryFormulaRepository, Substance};
use std::sync::Arc;
use uuid::Uuid;

fn engine_with_group() -> (ComparisonEngine<InMemoryFormulaRepository>, Uuid, Uuid, Uuid, Uuid, Uuid, Uuid) {
  let repo = Arc::new(InMemoryFormulaRepository::new());
  let user = Uuid::new_v4();
  let s1 = repo.save_substance(Substance::new("Vainillina").unwrap()).unwrap();
  let s2 = repo.save_substance(Substance::new("Linalool").unwrap()).unwrap();

  // A (principal) lleva s1; B lleva s1 y s2
  let a = repo.create_formula(&user, "Fresa base", None).unwrap();
  repo.upsert_ingredient(&user, &a.id(), &s1, 10.0, ConcentrationUnit::GramsPerKilogram).unwrap();
  let b = repo.create_variation(&user, &a.id(), "B").unwrap();
  let group = b.variation_group_id().unwrap();
  let edits = vec![formula_domain::ConcentrationEdit { formula_id: b.id(), substance_id: s1, concentration: 15.0 }];
  repo.bulk_update_concentrations(&user, &edits).unwrap();
  repo.upsert_ingredient(&user, &b.id(), &s2, 5.0, ConcentrationUnit::GramsPerKilogram).unwrap();

  let engine = ComparisonEngine::new(repo, Arc::new(InMemoryVisibilityStore::new()));
  (engine, user, group, a.id(), b.id(), s1, s2)
}

#[test]
fn union_covers_every_member_substance() {
  let (engine, user, group, a, b, s1, s2) = engine_with_group();
  let data = engine.load_comparison_data(&user, &group).unwrap();

  let ids = data.substance_ids();
  assert_eq!(ids.len(), 2);
  assert!(ids.contains(&s1));
  assert!(ids.contains(&s2));
  assert_eq!(data.member_ids(), vec![a, b]);

  // Conjuntos disjuntos no son error: A no tiene s2
  let map = ConcentrationMap::build(&data);
  assert!(map.is_missing(&s2, &a));
  assert_eq!(map.concentration(&s1, &a), Some(10.0));
  assert_eq!(map.concentration(&s1, &b), Some(15.0));
  assert_eq!(map.concentration(&s2, &b), Some(5.0));
}

#[test]
fn substance_order_is_stable_across_reloads() {
  let (engine, user, group, _a, _b, _s1, _s2) = engine_with_group();
  let first = engine.load_comparison_data(&user, &group).unwrap();
  let second = engine.load_comparison_data(&user, &group).unwrap();
  assert_eq!(first.substance_ids(), second.substance_ids());
  // Orden por nombre: Linalool antes que Vainillina
  let names: Vec<&str> = first.all_substances.iter().map(|s| s.name()).collect();
  assert_eq!(names, vec!["Linalool", "Vainillina"]);
}

#[test]
fn commit_round_trips_into_next_load() {
  let (engine, user, group, a, b, s1, s2) = engine_with_group();

  engine.set_pending_edit(a, s1, 14.0).unwrap();
  engine.set_pending_edit(b, s2, 8.0).unwrap();
  assert!(engine.has_unsaved_changes().unwrap());

  let written = engine.commit_pending(&user).unwrap();
  assert_eq!(written, 2);
  assert!(!engine.has_unsaved_changes().unwrap());

  let data = engine.load_comparison_data(&user, &group).unwrap();
  let map = ConcentrationMap::build(&data);
  assert_eq!(map.concentration(&s1, &a), Some(14.0));
  assert_eq!(map.concentration(&s2, &b), Some(8.0));
}

#[test]
fn failed_commit_keeps_the_accumulator() {
  let (engine, user, _group, a, _b, s1, _s2) = engine_with_group();

  engine.set_pending_edit(a, s1, 14.0).unwrap();
  // Edición sobre una celda inexistente: el lote completo debe fallar
  engine.set_pending_edit(a, Uuid::new_v4(), 3.0).unwrap();

  match engine.commit_pending(&user) {
    Err(DomainError::NotFound(_)) => {}
    other => panic!("expected NotFound, got {:?}", other),
  }
  // Nada se limpió: el usuario puede reintentar sin reteclear
  assert_eq!(engine.pending_count().unwrap(), 2);
}

#[test]
fn commit_with_empty_accumulator_is_a_no_op() {
  let (engine, user, _group, _a, _b, _s1, _s2) = engine_with_group();
  assert_eq!(engine.commit_pending(&user).unwrap(), 0);
}

#[test]
fn discard_drops_unsaved_changes() {
  let (engine, user, group, a, _b, s1, _s2) = engine_with_group();
  engine.set_pending_edit(a, s1, 99.0).unwrap();
  engine.discard_pending().unwrap();
  assert!(!engine.has_unsaved_changes().unwrap());

  let data = engine.load_comparison_data(&user, &group).unwrap();
  let map = ConcentrationMap::build(&data);
  assert_eq!(map.concentration(&s1, &a), Some(10.0));
}

#[test]
fn loading_someone_elses_group_is_unauthorized() {
  let (engine, _user, group, _a, _b, _s1, _s2) = engine_with_group();
  let stranger = Uuid::new_v4();
  match engine.load_comparison_data(&stranger, &group) {
    Err(DomainError::Unauthorized(_)) => {}
    other => panic!("expected Unauthorized, got {:?}", other),
  }
}
