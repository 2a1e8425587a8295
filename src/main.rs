use comparison::{ComparisonEngine, ConcentrationMap};
use formula_domain::{ConcentrationUnit, DomainError, FormulaRepository, Substance};
use formula_persistence::DieselFormulaRepository;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Pequeño menú interactivo para trabajar con grupos de variaciones
/// usando el repositorio proporcionado por `formula-persistence`.
///
/// La identidad del usuario se toma de `AROMA_USER` (uuid); si no está
/// definida se genera una para la sesión. El id de la cuenta semilla se
/// toma de `AROMA_SEED_USER` y se pasa explícitamente a la rutina de
/// sembrado: no hay constantes globales de usuario demo.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    dotenvy::dotenv().ok();

    // Inicializar repo (aplica migraciones embebidas si procede)
    let repo = formula_persistence::new_from_env().map_err(|e| Box::new(e) as Box<dyn Error>)?;
    let store = repo.visibility_store();
    let engine = ComparisonEngine::new(Arc::new(repo), Arc::new(store));

    let user = match std::env::var("AROMA_USER").ok().and_then(|v| Uuid::parse_str(v.trim()).ok()) {
        Some(u) => u,
        None => {
            let u = Uuid::new_v4();
            println!("AROMA_USER no definido; usando usuario de sesión {}", u);
            u
        }
    };

    loop {
        let pending = engine.pending_count().unwrap_or(0);
        println!("\n== Comparador de variaciones ==");
        println!("1) Ver grupos");
        println!("2) Ver tabla de comparación de un grupo");
        println!("3) Crear variación a partir de una fórmula");
        println!("4) Marcar variación principal");
        println!("5) Editar etiqueta/descripción de una variación");
        println!("6) Sincronizar descripciones desde una variación");
        println!("7) Editar concentración (pendiente, sin guardar)");
        println!("8) Guardar cambios pendientes ({} celdas)", pending);
        println!("9) Descartar cambios pendientes");
        println!("10) Mostrar/ocultar columna");
        println!("11) Eliminar variación");
        println!("12) Sembrar datos de demostración");
        println!("13) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => match engine.repository().list_groups(&user) {
                Ok(groups) if groups.is_empty() => println!("Sin grupos todavía (prueba la opción 12)"),
                Ok(groups) => {
                    println!("\nID                                   | NOMBRE");
                    println!("--------------------------------------------------------");
                    for g in groups {
                        println!("{} | {}", g.id(), g.name());
                    }
                }
                Err(e) => eprintln!("Error listando grupos: {}", e),
            },
            "2" => {
                let group_id = match prompt_uuid("Group id (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                if let Err(e) = print_comparison(&engine, &user, &group_id) {
                    eprintln!("Error cargando comparación: {}", e);
                }
            }
            "3" => {
                let source = match prompt_uuid("Fórmula fuente (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                let label = prompt("Etiqueta de la variación (ej: Light): ")?;
                match engine.repository().create_variation(&user, &source, label.trim()) {
                    Ok(v) => println!("Variación creada: {} en el grupo {}",
                                      v.id(),
                                      v.variation_group_id().map(|g| g.to_string()).unwrap_or_else(|| "-".into())),
                    Err(e) => eprintln!("Error creando variación: {}", e),
                }
            }
            "4" => {
                let formula_id = match prompt_uuid("Variación (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                match engine.repository().set_main_variation(&user, &formula_id) {
                    Ok(()) => println!("Variación principal: {}", formula_id),
                    Err(e) => eprintln!("Error marcando principal: {}", e),
                }
            }
            "5" => {
                let formula_id = match prompt_uuid("Variación (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                let label = prompt("Nueva etiqueta (enter para no cambiar): ")?;
                let description = prompt("Nueva descripción (enter para no cambiar): ")?;
                let label_opt = if label.trim().is_empty() { None } else { Some(label.trim().to_string()) };
                let desc_opt = if description.trim().is_empty() { None } else { Some(description.trim().to_string()) };
                match engine.repository().update_variation_details(&user, &formula_id, label_opt, desc_opt) {
                    Ok(f) => println!("Variación actualizada: {}", f),
                    Err(e) => eprintln!("Error actualizando variación: {}", e),
                }
            }
            "6" => {
                let source = match prompt_uuid("Variación fuente (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                match engine.repository().sync_variation_descriptions(&user, &source) {
                    Ok(()) => println!("Descripciones sincronizadas"),
                    Err(e) => eprintln!("Error sincronizando: {}", e),
                }
            }
            "7" => {
                let formula_id = match prompt_uuid("Variación (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                let substance_id = match prompt_uuid("Sustancia (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                let value_s = prompt("Concentración: ")?;
                let value: f64 = match value_s.trim().parse() {
                    Ok(v) => v,
                    Err(_) => {
                        eprintln!("Concentración inválida");
                        continue;
                    }
                };
                match engine.set_pending_edit(formula_id, substance_id, value) {
                    Ok(()) => println!("Edición acumulada ({} celdas sin guardar)", engine.pending_count().unwrap_or(0)),
                    Err(e) => eprintln!("Error acumulando edición: {}", e),
                }
            }
            "8" => match engine.commit_pending(&user) {
                Ok(0) => println!("No hay cambios pendientes"),
                Ok(n) => println!("Guardadas {} celdas", n),
                // El acumulador queda intacto: se puede reintentar
                Err(e) => eprintln!("Error guardando el lote: {}", e),
            },
            "9" => match engine.discard_pending() {
                Ok(()) => println!("Cambios pendientes descartados"),
                Err(e) => eprintln!("Error descartando: {}", e),
            },
            "10" => {
                let group_id = match prompt_uuid("Group id (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                let formula_id = match prompt_uuid("Columna/variación (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                match engine.toggle_column(&user, &group_id, &formula_id) {
                    Ok(visible) => println!("Columnas visibles ahora: {}", visible.len()),
                    Err(e) => eprintln!("Error alternando visibilidad: {}", e),
                }
            }
            "11" => {
                let formula_id = match prompt_uuid("Variación a eliminar (UUID): ")? {
                    Some(u) => u,
                    None => continue,
                };
                let confirm = prompt(&format!("Confirma borrado de {}? escribir 'yes' para confirmar: ", formula_id))?;
                if confirm.trim().to_lowercase() == "yes" {
                    match engine.repository().delete_variation(&user, &formula_id) {
                        Ok(()) => println!("Variación eliminada: {}", formula_id),
                        Err(e) => eprintln!("Error eliminando variación: {}", e),
                    }
                } else {
                    println!("Borrado cancelado");
                }
            }
            "12" => {
                // La cuenta semilla es configuración explícita, no una
                // constante compartida
                let seed_user = std::env::var("AROMA_SEED_USER").ok()
                                                                .and_then(|v| Uuid::parse_str(v.trim()).ok())
                                                                .unwrap_or(user);
                match seed_demo_data(engine.repository(), seed_user) {
                    Ok(group) => println!("Datos de demo sembrados para {}; grupo {}", seed_user, group),
                    Err(e) => eprintln!("Error sembrando datos: {}", e),
                }
            }
            "13" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

/// Imprime la cuadrícula sustancias × variaciones de un grupo: celdas
/// efectivas (pendiente ?? persistido), "—" para ausente, "*" para
/// sustancias presentes en una sola variación, y la fila de totales.
fn print_comparison(engine: &ComparisonEngine<DieselFormulaRepository>,
                    user: &Uuid,
                    group_id: &Uuid)
                    -> Result<(), DomainError> {
    let data = engine.load_comparison_data(user, group_id)?;
    let visible = engine.visible_columns(user, group_id)?;
    let columns: Vec<_> = data.variations.iter().filter(|v| visible.contains(&v.formula.id())).collect();
    let map = ConcentrationMap::build(&data);

    println!("\nGrupo: {} ({} variaciones, {} visibles)",
             data.group.name(),
             data.variations.len(),
             columns.len());
    print!("{:<28}", "SUSTANCIA");
    for col in &columns {
        let marker = if col.formula.is_main_variation() { " (principal)" } else { "" };
        print!(" | {:<18}", format!("{}{}", col.formula.display_label(), marker));
    }
    println!();

    for substance in &data.all_substances {
        print!("{:<28}", substance.name());
        for col in &columns {
            let formula_id = col.formula.id();
            let cell = match engine.effective_concentration(&map, &substance.id(), &formula_id)? {
                Some(c) => {
                    let unique = if map.is_unique(&substance.id(), &formula_id) { " *" } else { "" };
                    format!("{:.2}{}", c, unique)
                }
                None => "—".to_string(),
            };
            print!(" | {:<18}", cell);
        }
        println!();
    }

    print!("{:<28}", "TOTAL");
    for col in &columns {
        print!(" | {:<18}", format!("{:.2}", engine.variation_total(col)?));
    }
    println!();
    let pending = engine.pending_count()?;
    if pending > 0 {
        println!("({} celdas con cambios sin guardar)", pending);
    }
    Ok(())
}

/// Siembra un catálogo pequeño y un grupo de ejemplo para la cuenta
/// indicada. El id de la cuenta llega como parámetro desde la
/// configuración del arranque.
fn seed_demo_data<R: FormulaRepository>(repo: &R, seed_user: Uuid) -> Result<Uuid, DomainError> {
    let vanillin = Substance::new("Vainillina")?.with_odor("dulce, cremoso").with_fema_number(3107)?;
    let linalool = Substance::new("Linalool")?.with_odor("floral, cítrico").with_fema_number(2635)?;
    let maltol = Substance::new("Etil maltol")?.with_odor("algodón de azúcar").with_fema_number(3487)?;
    let lactone = Substance::new("gamma-Decalactona")?.with_odor("melocotón").with_fema_number(2360)?;
    let s_van = repo.save_substance(vanillin)?;
    let s_lin = repo.save_substance(linalool)?;
    let s_mal = repo.save_substance(maltol)?;
    let s_lac = repo.save_substance(lactone)?;

    let base = repo.create_formula(&seed_user, "Fresa base", Some("perfil dulce de referencia".into()))?;
    repo.upsert_ingredient(&seed_user, &base.id(), &s_van, 10.0, ConcentrationUnit::GramsPerKilogram)?;
    repo.upsert_ingredient(&seed_user, &base.id(), &s_lin, 2.5, ConcentrationUnit::GramsPerKilogram)?;
    repo.upsert_ingredient(&seed_user, &base.id(), &s_mal, 4.0, ConcentrationUnit::GramsPerKilogram)?;

    let light = repo.create_variation(&seed_user, &base.id(), "Light")?;
    let intense = repo.create_variation(&seed_user, &base.id(), "Intensa")?;
    // La variación intensa lleva además un toque de lactona
    repo.upsert_ingredient(&seed_user, &intense.id(), &s_lac, 1.2, ConcentrationUnit::GramsPerKilogram)?;
    repo.bulk_update_concentrations(&seed_user,
                                    &[formula_domain::ConcentrationEdit { formula_id: light.id(),
                                                                          substance_id: s_van,
                                                                          concentration: 6.0 },
                                      formula_domain::ConcentrationEdit { formula_id: intense.id(),
                                                                          substance_id: s_van,
                                                                          concentration: 14.0 }])?;

    light.variation_group_id()
         .ok_or(DomainError::PersistenceError("la variación sembrada quedó sin grupo".into()))
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}

fn prompt_uuid(msg: &str) -> io::Result<Option<Uuid>> {
    let raw = prompt(msg)?;
    match Uuid::parse_str(raw.trim()) {
        Ok(u) => Ok(Some(u)),
        Err(_) => {
            eprintln!("UUID inválido");
            Ok(None)
        }
    }
}
