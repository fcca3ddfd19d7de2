//! Import core for WrenchCloud, a multi-tenant workshop management service.
//!
//! Two pipelines feed the same target schema: a heuristic recovery scan over
//! CarVault's binary backup container, and a typed decode of Invoice Ninja's
//! JSON export. Both run all-or-nothing inside one database transaction and
//! report a per-entity summary. The web boundary (routing, auth, upload
//! handling) lives in the host application; this crate exposes the library
//! surface it calls.

pub mod archive;
pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod sequence;
pub mod storage;

pub use error::{AppError, AppResult};
pub use model::{ImportContext, ImportSummary, TenantNumbering};
