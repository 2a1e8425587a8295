use formula_domain::{ConcentrationEdit, ConcentrationUnit, DomainError, FormulaRepository, Substance};
use formula_persistence::new_from_env;
use uuid::Uuid;

#[test]
fn diesel_variation_lifecycle() {
  // Use a temporary file-backed SQLite DB for tests to avoid URI parsing
  // options problems with different sqlite builds.
  let tmp_path = std::env::temp_dir().join(format!("aroma_test_{}.db", Uuid::new_v4()));
  let db_url = tmp_path.to_str().unwrap().to_string();
  std::env::set_var("AROMA_DB_URL", &db_url);
  // If crate was built with the `pg` feature, skip this sqlite-only test at
  // runtime.
  if cfg!(feature = "pg") {
    eprintln!("skipping sqlite-only persistence test because 'pg' feature is enabled");
    return;
  }
  let repo = new_from_env().expect("failed to create repo");
  let user = Uuid::new_v4();

  // Catálogo mínimo
  let s1 = repo.save_substance(Substance::new("Vainillina").expect("s1")).expect("save s1");
  let s2 = repo.save_substance(Substance::new("Linalool").expect("s2")).expect("save s2");

  // Fórmula fuente con una sustancia
  let source = repo.create_formula(&user, "Fresa base", Some("perfil dulce".into())).expect("create formula");
  repo.upsert_ingredient(&user, &source.id(), &s1, 10.0, ConcentrationUnit::GramsPerKilogram)
      .expect("upsert s1");

  // Primera variación: grupo nuevo, fuente promovida a principal, copia
  // profunda de ingredientes
  let copy = repo.create_variation(&user, &source.id(), "Light").expect("create variation");
  let group = copy.variation_group_id().expect("copy joined group");
  let reloaded_source = repo.get_formula(&user, &source.id()).expect("reload source");
  assert!(reloaded_source.is_main_variation());
  assert_eq!(reloaded_source.variation_group_id(), Some(group));

  let copy_rows = repo.ingredients_of(&user, &copy.id()).expect("copy rows");
  assert_eq!(copy_rows.len(), 1);
  assert_eq!(copy_rows[0].substance_id(), s1);
  assert_eq!(copy_rows[0].concentration(), 10.0);

  // Etiqueta duplicada rechazada
  match repo.create_variation(&user, &source.id(), "Light") {
    Err(DomainError::DuplicateLabel(_)) => {}
    other => panic!("expected DuplicateLabel, got {:?}", other),
  }

  // El upsert mantiene una sola fila por par
  repo.upsert_ingredient(&user, &copy.id(), &s1, 12.0, ConcentrationUnit::GramsPerKilogram)
      .expect("upsert existing");
  let copy_rows = repo.ingredients_of(&user, &copy.id()).expect("copy rows after upsert");
  assert_eq!(copy_rows.len(), 1);
  assert_eq!(copy_rows[0].concentration(), 12.0);
  repo.upsert_ingredient(&user, &copy.id(), &s2, 5.0, ConcentrationUnit::GramsPerKilogram)
      .expect("upsert s2");

  // set_main mueve el flag y deja exactamente una principal
  repo.set_main_variation(&user, &copy.id()).expect("set main");
  let members = repo.group_members(&user, &group).expect("members");
  let mains: Vec<_> = members.iter().filter(|m| m.is_main_variation()).collect();
  assert_eq!(mains.len(), 1);
  assert_eq!(mains[0].id(), copy.id());

  // Lote todo-o-nada: una celda inexistente anula el lote completo
  let bad = vec![ConcentrationEdit { formula_id: copy.id(), substance_id: s1, concentration: 99.0 },
                 ConcentrationEdit { formula_id: copy.id(), substance_id: Uuid::new_v4(), concentration: 1.0 }];
  assert!(repo.bulk_update_concentrations(&user, &bad).is_err());
  let rows = repo.ingredients_of(&user, &copy.id()).expect("rows after failed batch");
  assert_eq!(rows.iter().find(|r| r.substance_id() == s1).unwrap().concentration(), 12.0);

  // Lote válido: ida y vuelta exacta
  let good = vec![ConcentrationEdit { formula_id: copy.id(), substance_id: s1, concentration: 14.0 },
                  ConcentrationEdit { formula_id: source.id(), substance_id: s1, concentration: 8.5 }];
  repo.bulk_update_concentrations(&user, &good).expect("bulk update");
  let rows = repo.ingredients_of(&user, &copy.id()).expect("rows after batch");
  assert_eq!(rows.iter().find(|r| r.substance_id() == s1).unwrap().concentration(), 14.0);
  let rows = repo.ingredients_of(&user, &source.id()).expect("source rows after batch");
  assert_eq!(rows.iter().find(|r| r.substance_id() == s1).unwrap().concentration(), 8.5);

  // Propiedad: otro usuario no ve ni toca nada
  let stranger = Uuid::new_v4();
  assert!(matches!(repo.get_formula(&stranger, &copy.id()), Err(DomainError::Unauthorized(_))));
  assert!(matches!(repo.get_group(&stranger, &group), Err(DomainError::Unauthorized(_))));

  // Borrar la principal promueve al superviviente más antiguo
  repo.delete_variation(&user, &copy.id()).expect("delete copy");
  let members = repo.group_members(&user, &group).expect("members after delete");
  assert_eq!(members.len(), 1);
  assert!(members[0].is_main_variation());

  // Borrar el último miembro disuelve el grupo
  repo.delete_variation(&user, &source.id()).expect("delete source");
  assert!(matches!(repo.get_group(&user, &group), Err(DomainError::NotFound(_))));

  // Purga de cuenta: idempotente sobre lo que quede
  repo.purge_user_data(&user).expect("purge");

  let _ = std::fs::remove_file(tmp_path);
}
