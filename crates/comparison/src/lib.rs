//! Crate `comparison` — motor de comparación de variaciones de fórmulas
//!
//! Este crate reúne las piezas que permiten ver lado a lado todas las
//! variaciones de un grupo: el cargador de datos (`ComparisonData`), el
//! acumulador de ediciones pendientes (`PendingEdits`), las métricas
//! derivadas puras (`ConcentrationMap`, totales, únicas/ausentes), la
//! política de visibilidad de columnas (`ColumnVisibility` sobre un
//! `VisibilityStore`) y un motor fachada (`ComparisonEngine`) que orquesta
//! cargar → editar → confirmar → recargar contra un `FormulaRepository`.
//!
//! Diseño resumido:
//! - Superposición local sobre la fuente remota: el valor efectivo de una
//!   celda es `pendiente ?? persistido`, con un único punto de limpieza
//!   (el commit exitoso).
//! - Commit por lotes todo-o-nada: un fallo deja el acumulador intacto
//!   para que el usuario reintente sin reteclear.
//! - Orden determinista: la unión de sustancias se ordena por nombre (y
//!   por id en empates) para que la cuadrícula no se reordene al guardar.
//!
//! Ejemplo rápido:
//! ```rust
//! use comparison::{ComparisonEngine, InMemoryVisibilityStore};
//! use formula_domain::InMemoryFormulaRepository;
//! use std::sync::Arc;
//! let repo = Arc::new(InMemoryFormulaRepository::new());
//! let store = Arc::new(InMemoryVisibilityStore::new());
//! let engine = ComparisonEngine::new(repo, store);
//! ```
pub mod data;
pub mod engine;
pub mod metrics;
pub mod pending;
pub mod visibility;

pub use data::*;
pub use engine::*;
pub use metrics::*;
pub use pending::*;
pub use visibility::*;
