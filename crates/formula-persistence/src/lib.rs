//! Persistencia Diesel para el dominio de formulación.
//! Este archivo expone el módulo `schema` y reexporta el repositorio
//! Diesel que implementa `FormulaRepository` y el almacén de preferencias
//! de visibilidad. La implementación detallada está en
//! `domain_persistence.rs` y `visibility_persistence.rs`.

mod domain_persistence;
pub mod schema;
mod visibility_persistence;

#[cfg(not(feature = "pg"))]
pub use domain_persistence::new_sqlite_for_test;
pub use domain_persistence::{new_from_env, DieselFormulaRepository};
pub use visibility_persistence::DieselVisibilityStore;
