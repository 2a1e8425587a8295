use crate::schema;
use crate::schema::column_preferences::dsl as prefs_dsl;
use crate::schema::formulas::dsl as formulas_dsl;
use crate::schema::substance_formula::dsl as sf_dsl;
use crate::schema::substances::dsl as substances_dsl;
use crate::schema::variation_groups::dsl as groups_dsl;
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use formula_domain::{ConcentrationEdit, ConcentrationUnit, DomainError, Formula, FormulaIngredient, FormulaRepository,
                     Substance, VariationGroup};
use log::debug;
use std::sync::Arc;
use uuid::Uuid;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
#[cfg(all(feature = "pg", not(test)))]
pub(crate) type DbPool = Pool<ConnectionManager<PgConnection>>;
#[cfg(any(test, not(feature = "pg")))]
pub(crate) type DbPool = Pool<ConnectionManager<SqliteConnection>>;
#[cfg(all(feature = "pg", not(test)))]
pub(crate) type DbConn = PgConnection;
#[cfg(any(test, not(feature = "pg")))]
pub(crate) type DbConn = SqliteConnection;
pub(crate) type PooledConn = PooledConnection<ConnectionManager<DbConn>>;

/// Repo Diesel que implementa `FormulaRepository`.
pub struct DieselFormulaRepository {
  pool: Arc<DbPool>,
}
impl DieselFormulaRepository {
  pub fn new(database_url: &str) -> Self {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let pool = Pool::builder().max_size(4).build(manager).expect("no se pudo crear el pool de conexiones");
    let repo = DieselFormulaRepository { pool: Arc::new(pool) };
    if let Ok(mut c) = repo.conn_raw() {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
      let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
      let _ = c.run_pending_migrations(MIGRATIONS);
    }
    repo
  }
  fn conn_raw(&self) -> std::result::Result<PooledConn, r2d2::Error> {
    self.pool.get()
  }
  fn conn(&self) -> Result<PooledConn, DomainError> {
    self.conn_raw().map_err(|e| DomainError::PersistenceError(format!("pool: {}", e)))
  }
  /// Almacén de preferencias de visibilidad que comparte el pool.
  pub fn visibility_store(&self) -> crate::DieselVisibilityStore {
    crate::DieselVisibilityStore::with_pool(self.pool.clone())
  }
}
// Diesel row structs for the formulation tables
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::substances)]
struct SubstanceRow {
  pub id: String,
  pub name: String,
  pub odor: Option<String>,
  pub fema_number: Option<i32>,
  pub cas_number: Option<String>,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::variation_groups)]
struct GroupRow {
  pub id: String,
  pub owner_id: String,
  pub name: String,
  pub description: Option<String>,
  pub created_at_ts: i64,
}
#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = schema::formulas)]
struct FormulaRow {
  pub id: String,
  pub owner_id: String,
  pub name: String,
  pub description: Option<String>,
  pub variation_group_id: Option<String>,
  pub variation_label: Option<String>,
  pub is_main_variation: bool,
  pub created_at_ts: i64,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::substance_formula)]
struct IngredientRow {
  pub id: String,
  pub formula_id: String,
  pub substance_id: String,
  pub concentration: f64,
  pub unit: String,
  pub sort_order: i32,
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, DomainError> {
  res.map_err(|e| DomainError::PersistenceError(format!("db: {}", e)))
}
// Deserialización validada en la frontera de persistencia: cada fila se
// convierte una única vez en su entidad tipada, sin casts repartidos por
// los call sites.
fn parse_uuid(s: &str) -> Result<Uuid, DomainError> {
  Uuid::parse_str(s).map_err(|e| DomainError::PersistenceError(format!("uuid inválido '{}': {}", s, e)))
}
fn from_ts(ts: i64) -> Result<DateTime<Utc>, DomainError> {
  Utc.timestamp_millis_opt(ts)
     .single()
     .ok_or_else(|| DomainError::PersistenceError(format!("timestamp inválido: {}", ts)))
}
impl SubstanceRow {
  fn from_entity(s: &Substance) -> Self {
    SubstanceRow { id: s.id().to_string(),
                   name: s.name().to_string(),
                   odor: s.odor().map(|o| o.to_string()),
                   fema_number: s.fema_number(),
                   cas_number: s.cas_number().map(|c| c.to_string()) }
  }
  fn into_entity(self) -> Result<Substance, DomainError> {
    Substance::from_parts(parse_uuid(&self.id)?, &self.name, self.odor, self.fema_number, self.cas_number)
  }
}
impl GroupRow {
  fn from_entity(g: &VariationGroup) -> Self {
    GroupRow { id: g.id().to_string(),
               owner_id: g.owner_id().to_string(),
               name: g.name().to_string(),
               description: g.description().map(|d| d.to_string()),
               created_at_ts: g.created_at().timestamp_millis() }
  }
  fn into_entity(self) -> Result<VariationGroup, DomainError> {
    VariationGroup::from_parts(parse_uuid(&self.id)?,
                               parse_uuid(&self.owner_id)?,
                               &self.name,
                               self.description,
                               from_ts(self.created_at_ts)?)
  }
}
impl FormulaRow {
  fn from_entity(f: &Formula) -> Self {
    FormulaRow { id: f.id().to_string(),
                 owner_id: f.owner_id().to_string(),
                 name: f.name().to_string(),
                 description: f.description().map(|d| d.to_string()),
                 variation_group_id: f.variation_group_id().map(|g| g.to_string()),
                 variation_label: f.variation_label().map(|l| l.to_string()),
                 is_main_variation: f.is_main_variation(),
                 created_at_ts: f.created_at().timestamp_millis() }
  }
  fn into_entity(self) -> Result<Formula, DomainError> {
    let group = match self.variation_group_id {
      Some(ref g) => Some(parse_uuid(g)?),
      None => None,
    };
    Formula::from_parts(parse_uuid(&self.id)?,
                        parse_uuid(&self.owner_id)?,
                        &self.name,
                        self.description,
                        group,
                        self.variation_label,
                        self.is_main_variation,
                        from_ts(self.created_at_ts)?)
  }
}
impl IngredientRow {
  fn from_entity(i: &FormulaIngredient) -> Self {
    IngredientRow { id: Uuid::new_v4().to_string(),
                    formula_id: i.formula_id().to_string(),
                    substance_id: i.substance_id().to_string(),
                    concentration: i.concentration(),
                    unit: i.unit().as_str().to_string(),
                    sort_order: i.position() }
  }
  fn into_entity(self) -> Result<FormulaIngredient, DomainError> {
    FormulaIngredient::new(parse_uuid(&self.formula_id)?,
                           parse_uuid(&self.substance_id)?,
                           self.concentration,
                           ConcentrationUnit::parse(&self.unit)?,
                           self.sort_order)
  }
}
// Lecturas compartidas: cargar y verificar propiedad antes de mutar.
fn load_formula_row(conn: &mut PooledConn, formula_id: &Uuid) -> Result<Option<FormulaRow>, DomainError> {
  map_db_err(formulas_dsl::formulas.filter(formulas_dsl::id.eq(formula_id.to_string()))
                                   .first::<FormulaRow>(conn)
                                   .optional())
}
fn owned_formula_row(conn: &mut PooledConn, caller: &Uuid, formula_id: &Uuid) -> Result<FormulaRow, DomainError> {
  let row = load_formula_row(conn, formula_id)?.ok_or(DomainError::NotFound(format!("fórmula {}", formula_id)))?;
  if row.owner_id != caller.to_string() {
    return Err(DomainError::Unauthorized(format!("fórmula {}", formula_id)));
  }
  Ok(row)
}
fn member_rows(conn: &mut PooledConn, group_id: &str) -> Result<Vec<FormulaRow>, DomainError> {
  map_db_err(formulas_dsl::formulas.filter(formulas_dsl::variation_group_id.eq(Some(group_id.to_string())))
                                   .order((formulas_dsl::created_at_ts.asc(), formulas_dsl::id.asc()))
                                   .load::<FormulaRow>(conn))
}
fn ingredient_rows(conn: &mut PooledConn, formula_id: &str) -> Result<Vec<IngredientRow>, DomainError> {
  map_db_err(sf_dsl::substance_formula.filter(sf_dsl::formula_id.eq(formula_id.to_string()))
                                      .order((sf_dsl::sort_order.asc(), sf_dsl::substance_id.asc()))
                                      .load::<IngredientRow>(conn))
}
impl FormulaRepository for DieselFormulaRepository {
  fn save_substance(&self, substance: Substance) -> Result<Uuid, DomainError> {
    let mut conn = self.conn()?;
    let row = SubstanceRow::from_entity(&substance);
    // Upsert: try insert, on conflict replace by delete+insert
    if diesel::insert_into(substances_dsl::substances).values(&row).execute(&mut conn).is_err() {
      let _ = diesel::delete(substances_dsl::substances.filter(substances_dsl::id.eq(&row.id))).execute(&mut conn);
      map_db_err(diesel::insert_into(substances_dsl::substances).values(&row).execute(&mut conn))?;
    }
    Ok(substance.id())
  }
  fn get_substance(&self, id: &Uuid) -> Result<Option<Substance>, DomainError> {
    let mut conn = self.conn()?;
    let opt = map_db_err(substances_dsl::substances.filter(substances_dsl::id.eq(id.to_string()))
                                                   .first::<SubstanceRow>(&mut conn)
                                                   .optional())?;
    opt.map(|r| r.into_entity()).transpose()
  }
  fn substances_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Substance>, DomainError> {
    let mut conn = self.conn()?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
      let opt = map_db_err(substances_dsl::substances.filter(substances_dsl::id.eq(id.to_string()))
                                                     .first::<SubstanceRow>(&mut conn)
                                                     .optional())?;
      let row = opt.ok_or(DomainError::NotFound(format!("sustancia {}", id)))?;
      out.push(row.into_entity()?);
    }
    Ok(out)
  }
  fn list_substances(&self) -> Result<Vec<Substance>, DomainError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(substances_dsl::substances.order((substances_dsl::name.asc(), substances_dsl::id.asc()))
                                                    .load::<SubstanceRow>(&mut conn))?;
    rows.into_iter().map(|r| r.into_entity()).collect()
  }
  fn create_formula(&self, caller: &Uuid, name: &str, description: Option<String>) -> Result<Formula, DomainError> {
    let formula = Formula::new(*caller, name)?.with_description(description);
    let mut conn = self.conn()?;
    let row = FormulaRow::from_entity(&formula);
    map_db_err(diesel::insert_into(formulas_dsl::formulas).values(&row).execute(&mut conn))?;
    Ok(formula)
  }
  fn get_formula(&self, caller: &Uuid, formula_id: &Uuid) -> Result<Formula, DomainError> {
    let mut conn = self.conn()?;
    owned_formula_row(&mut conn, caller, formula_id)?.into_entity()
  }
  fn upsert_ingredient(&self,
                       caller: &Uuid,
                       formula_id: &Uuid,
                       substance_id: &Uuid,
                       concentration: f64,
                       unit: ConcentrationUnit)
                       -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    owned_formula_row(&mut conn, caller, formula_id)?;
    let sub_exists = map_db_err(substances_dsl::substances.filter(substances_dsl::id.eq(substance_id.to_string()))
                                                          .select(substances_dsl::id)
                                                          .first::<String>(&mut conn)
                                                          .optional())?;
    if sub_exists.is_none() {
      return Err(DomainError::NotFound(format!("sustancia {}", substance_id)));
    }

    let existing = map_db_err(sf_dsl::substance_formula.filter(sf_dsl::formula_id.eq(formula_id.to_string()))
                                                       .filter(sf_dsl::substance_id.eq(substance_id.to_string()))
                                                       .first::<IngredientRow>(&mut conn)
                                                       .optional())?;
    if let Some(row) = existing {
      // La validación vive en la entidad; reconstruir y reescribir
      let updated = row.into_entity()?.with_concentration(concentration)?;
      map_db_err(diesel::update(sf_dsl::substance_formula.filter(sf_dsl::formula_id.eq(formula_id.to_string()))
                                                         .filter(sf_dsl::substance_id.eq(substance_id.to_string())))
                 .set(sf_dsl::concentration.eq(updated.concentration()))
                 .execute(&mut conn))?;
    } else {
      let next = map_db_err(sf_dsl::substance_formula.filter(sf_dsl::formula_id.eq(formula_id.to_string()))
                                                     .select(diesel::dsl::max(sf_dsl::sort_order))
                                                     .first::<Option<i32>>(&mut conn))?;
      let position = next.map(|p| p + 1).unwrap_or(0);
      let entity = FormulaIngredient::new(*formula_id, *substance_id, concentration, unit, position)?;
      let row = IngredientRow::from_entity(&entity);
      map_db_err(diesel::insert_into(sf_dsl::substance_formula).values(&row)
                                                               .on_conflict_do_nothing()
                                                               .execute(&mut conn))?;
    }
    Ok(())
  }
  fn ingredients_of(&self, caller: &Uuid, formula_id: &Uuid) -> Result<Vec<FormulaIngredient>, DomainError> {
    let mut conn = self.conn()?;
    owned_formula_row(&mut conn, caller, formula_id)?;
    let rows = ingredient_rows(&mut conn, &formula_id.to_string())?;
    rows.into_iter().map(|r| r.into_entity()).collect()
  }
  fn create_variation(&self, caller: &Uuid, source_formula_id: &Uuid, label: &str) -> Result<Formula, DomainError> {
    let label = label.trim();
    if label.is_empty() {
      return Err(DomainError::ValidationError("La etiqueta de la variación no puede estar vacía".to_string()));
    }
    let mut conn = self.conn()?;
    let source_row = owned_formula_row(&mut conn, caller, source_formula_id)?;
    let source = source_row.clone().into_entity()?;

    // Primera variación: habrá que crear el grupo y promover la fuente
    let (group_id, new_group) = match source.variation_group_id() {
      Some(g) => (g, None),
      None => {
        let group = VariationGroup::new(*caller, source.name())?;
        (group.id(), Some(GroupRow::from_entity(&group)))
      }
    };
    let group_id_s = group_id.to_string();

    if new_group.is_none() {
      for member in member_rows(&mut conn, &group_id_s)? {
        if member.variation_label.as_deref() == Some(label) {
          return Err(DomainError::DuplicateLabel(label.to_string()));
        }
      }
    }

    let copy = Formula::new(*caller, source.name())?
      .with_description(source.description().map(|s| s.to_string()))
      .with_variation(group_id, Some(label.to_string()), false);
    let copy_row = FormulaRow::from_entity(&copy);
    let source_rows = ingredient_rows(&mut conn, &source_row.id)?;
    let copy_ingredients: Vec<IngredientRow> =
      source_rows.iter()
                 .map(|r| IngredientRow { id: Uuid::new_v4().to_string(),
                                          formula_id: copy_row.id.clone(),
                                          substance_id: r.substance_id.clone(),
                                          concentration: r.concentration,
                                          unit: r.unit.clone(),
                                          sort_order: r.sort_order })
                 .collect();

    let source_id_s = source_row.id.clone();
    map_db_err(conn.transaction::<_, DieselError, _>(|conn| {
                 if let Some(ref group_row) = new_group {
                   diesel::insert_into(groups_dsl::variation_groups).values(group_row).execute(conn)?;
                   diesel::update(formulas_dsl::formulas.filter(formulas_dsl::id.eq(&source_id_s)))
                     .set((formulas_dsl::variation_group_id.eq(Some(group_id_s.clone())),
                           formulas_dsl::is_main_variation.eq(true)))
                     .execute(conn)?;
                 }
                 diesel::insert_into(formulas_dsl::formulas).values(&copy_row).execute(conn)?;
                 for row in &copy_ingredients {
                   // A lo sumo una fila por par (sustancia, fórmula)
                   diesel::insert_into(sf_dsl::substance_formula).values(row)
                                                                 .on_conflict_do_nothing()
                                                                 .execute(conn)?;
                 }
                 Ok(())
               }))?;
    debug!("variación '{}' creada en el grupo {}", label, group_id);
    Ok(copy)
  }
  fn set_main_variation(&self, caller: &Uuid, formula_id: &Uuid) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let row = owned_formula_row(&mut conn, caller, formula_id)?;
    let group_id_s = row.variation_group_id
                        .ok_or(DomainError::NotFound(format!("la fórmula {} no pertenece a un grupo", formula_id)))?;
    let target_id_s = row.id;
    // Limpiar y marcar dentro de la misma transacción: exactamente un
    // miembro principal por grupo
    map_db_err(conn.transaction::<_, DieselError, _>(|conn| {
                 diesel::update(formulas_dsl::formulas
                     .filter(formulas_dsl::variation_group_id.eq(Some(group_id_s.clone()))))
                   .set(formulas_dsl::is_main_variation.eq(false))
                   .execute(conn)?;
                 diesel::update(formulas_dsl::formulas.filter(formulas_dsl::id.eq(&target_id_s)))
                   .set(formulas_dsl::is_main_variation.eq(true))
                   .execute(conn)?;
                 Ok(())
               }))
  }
  fn update_variation_details(&self,
                              caller: &Uuid,
                              formula_id: &Uuid,
                              label: Option<String>,
                              description: Option<String>)
                              -> Result<Formula, DomainError> {
    let mut conn = self.conn()?;
    let row = owned_formula_row(&mut conn, caller, formula_id)?;
    let merged_label = match label {
      Some(l) => {
        if l.trim().is_empty() {
          return Err(DomainError::ValidationError("La etiqueta de la variación no puede estar vacía".to_string()));
        }
        Some(l.trim().to_string())
      }
      None => row.variation_label.clone(),
    };
    let merged_description = description.or(row.description.clone());
    map_db_err(diesel::update(formulas_dsl::formulas.filter(formulas_dsl::id.eq(&row.id)))
               .set((formulas_dsl::variation_label.eq(merged_label.clone()),
                     formulas_dsl::description.eq(merged_description.clone())))
               .execute(&mut conn))?;
    let mut updated = row;
    updated.variation_label = merged_label;
    updated.description = merged_description;
    updated.into_entity()
  }
  fn sync_variation_descriptions(&self, caller: &Uuid, source_formula_id: &Uuid) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let row = owned_formula_row(&mut conn, caller, source_formula_id)?;
    let group_id_s = row.variation_group_id
                        .ok_or(DomainError::NotFound(format!("la fórmula {} no pertenece a un grupo",
                                                             source_formula_id)))?;
    map_db_err(diesel::update(formulas_dsl::formulas
                   .filter(formulas_dsl::variation_group_id.eq(Some(group_id_s)))
                   .filter(formulas_dsl::id.ne(&row.id)))
               .set(formulas_dsl::description.eq(row.description.clone()))
               .execute(&mut conn))?;
    Ok(())
  }
  fn delete_variation(&self, caller: &Uuid, formula_id: &Uuid) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let row = owned_formula_row(&mut conn, caller, formula_id)?;
    let group_id_s = row.variation_group_id
                        .clone()
                        .ok_or(DomainError::NotFound(format!("la fórmula {} no pertenece a un grupo", formula_id)))?;
    let survivors: Vec<FormulaRow> =
      member_rows(&mut conn, &group_id_s)?.into_iter().filter(|m| m.id != row.id).collect();
    let heir_id = if row.is_main_variation { survivors.first().map(|h| h.id.clone()) } else { None };
    let dissolve = survivors.is_empty();

    let target_id_s = row.id;
    map_db_err(conn.transaction::<_, DieselError, _>(|conn| {
                 diesel::delete(sf_dsl::substance_formula.filter(sf_dsl::formula_id.eq(&target_id_s))).execute(conn)?;
                 diesel::delete(formulas_dsl::formulas.filter(formulas_dsl::id.eq(&target_id_s))).execute(conn)?;
                 if dissolve {
                   diesel::delete(prefs_dsl::column_preferences.filter(prefs_dsl::group_id.eq(&group_id_s)))
                     .execute(conn)?;
                   diesel::delete(groups_dsl::variation_groups.filter(groups_dsl::id.eq(&group_id_s))).execute(conn)?;
                 } else if let Some(ref heir) = heir_id {
                   // Conservar el invariante de principal única
                   diesel::update(formulas_dsl::formulas.filter(formulas_dsl::id.eq(heir)))
                     .set(formulas_dsl::is_main_variation.eq(true))
                     .execute(conn)?;
                 }
                 Ok(())
               }))
  }
  fn get_group(&self, caller: &Uuid, group_id: &Uuid) -> Result<VariationGroup, DomainError> {
    let mut conn = self.conn()?;
    let opt = map_db_err(groups_dsl::variation_groups.filter(groups_dsl::id.eq(group_id.to_string()))
                                                     .first::<GroupRow>(&mut conn)
                                                     .optional())?;
    let row = opt.ok_or(DomainError::NotFound(format!("grupo {}", group_id)))?;
    if row.owner_id != caller.to_string() {
      return Err(DomainError::Unauthorized(format!("grupo {}", group_id)));
    }
    row.into_entity()
  }
  fn list_groups(&self, caller: &Uuid) -> Result<Vec<VariationGroup>, DomainError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(groups_dsl::variation_groups.filter(groups_dsl::owner_id.eq(caller.to_string()))
                                                      .order((groups_dsl::created_at_ts.asc(), groups_dsl::id.asc()))
                                                      .load::<GroupRow>(&mut conn))?;
    rows.into_iter().map(|r| r.into_entity()).collect()
  }
  fn group_members(&self, caller: &Uuid, group_id: &Uuid) -> Result<Vec<Formula>, DomainError> {
    self.get_group(caller, group_id)?;
    let mut conn = self.conn()?;
    let rows = member_rows(&mut conn, &group_id.to_string())?;
    rows.into_iter().map(|r| r.into_entity()).collect()
  }
  fn bulk_update_concentrations(&self, caller: &Uuid, edits: &[ConcentrationEdit]) -> Result<(), DomainError> {
    // Validar y verificar propiedad antes de escribir nada
    for e in edits {
      e.validate()?;
    }
    let mut conn = self.conn()?;
    let mut checked: Vec<Uuid> = Vec::new();
    for e in edits {
      if !checked.contains(&e.formula_id) {
        owned_formula_row(&mut conn, caller, &e.formula_id)?;
        checked.push(e.formula_id);
      }
    }
    // Un lote = una transacción, todo-o-nada
    conn.transaction::<_, DieselError, _>(|conn| {
          for e in edits {
            let n = diesel::update(sf_dsl::substance_formula
                .filter(sf_dsl::formula_id.eq(e.formula_id.to_string()))
                .filter(sf_dsl::substance_id.eq(e.substance_id.to_string())))
              .set(sf_dsl::concentration.eq(e.concentration))
              .execute(conn)?;
            if n == 0 {
              return Err(DieselError::NotFound);
            }
          }
          Ok(())
        })
        .map_err(|e| match e {
          DieselError::NotFound => DomainError::NotFound("fila de ingrediente inexistente en el lote".to_string()),
          other => DomainError::PersistenceError(format!("db: {}", other)),
        })?;
    debug!("lote aplicado: {} ediciones", edits.len());
    Ok(())
  }
  fn purge_user_data(&self, user_id: &Uuid) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let user_id_s = user_id.to_string();
    let doomed: Vec<String> = map_db_err(formulas_dsl::formulas.filter(formulas_dsl::owner_id.eq(&user_id_s))
                                                               .select(formulas_dsl::id)
                                                               .load::<String>(&mut conn))?;
    map_db_err(conn.transaction::<_, DieselError, _>(|conn| {
                 diesel::delete(sf_dsl::substance_formula.filter(sf_dsl::formula_id.eq_any(&doomed))).execute(conn)?;
                 diesel::delete(formulas_dsl::formulas.filter(formulas_dsl::owner_id.eq(&user_id_s))).execute(conn)?;
                 diesel::delete(groups_dsl::variation_groups.filter(groups_dsl::owner_id.eq(&user_id_s)))
                   .execute(conn)?;
                 diesel::delete(prefs_dsl::column_preferences.filter(prefs_dsl::user_id.eq(&user_id_s)))
                   .execute(conn)?;
                 Ok(())
               }))
  }
}
/// Crear repo desde las variables de entorno (o default sqlite in-memory
/// en tests)
#[cfg(all(feature = "pg", not(test)))]
pub fn new_from_env() -> Result<DieselFormulaRepository, DomainError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("AROMA_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                         .map_err(|_| {
                                           DomainError::PersistenceError("AROMA_DB_URL / DATABASE_URL not set".into())
                                         })?;
  if !(url.starts_with("postgres") || url.starts_with("postgresql://") || url.contains("@")) {
    return Err(DomainError::PersistenceError("formula-persistence: AROMA_DB_URL does not look like Postgres URL".into()));
  }
  Ok(DieselFormulaRepository::new(&url))
}
#[cfg(test)]
pub fn new_from_env() -> Result<DieselFormulaRepository, DomainError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("AROMA_DB_URL").unwrap_or_else(|_| "file:aromadb?mode=memory&cache=shared".into());
  Ok(DieselFormulaRepository::new(&url))
}
#[cfg(all(not(feature = "pg"), not(test)))]
pub fn new_from_env() -> Result<DieselFormulaRepository, DomainError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("AROMA_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                         .map_err(|_| {
                                           DomainError::PersistenceError("AROMA_DB_URL / DATABASE_URL not set".into())
                                         })?;
  let url_l = url.to_lowercase();
  if url_l.starts_with("file:") || url_l.contains("mode=memory") || url_l.contains("sqlite") || url_l.ends_with(".db") {
    return Ok(DieselFormulaRepository::new(&url));
  }
  Err(DomainError::PersistenceError("formula-persistence was compiled without 'pg' feature; enable the 'pg' feature \
                                     to use Postgres in production"
                                                                   .into()))
}
// Test helper: construct a DieselFormulaRepository backed by explicit
// SQLite connection manager. This bypasses environment parsing and avoids
// cases where the build or features might cause the ConnectionManager to
// treat the string as Postgres connection info.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(database_url: &str) -> DieselFormulaRepository {
  let manager = ConnectionManager::<SqliteConnection>::new(database_url);
  let pool = Pool::builder().max_size(4).build(manager).expect("no se pudo crear el pool de conexiones");
  let repo = DieselFormulaRepository { pool: Arc::new(pool) };
  if let Ok(mut c) = repo.conn_raw() {
    let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
    let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
    let _ = c.run_pending_migrations(MIGRATIONS);
  }
  repo
}
