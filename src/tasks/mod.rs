//! Concrete task kinds run by the pipelines.

pub mod composite;
pub mod db;
pub mod embedding;

#[cfg(test)]
mod tests;

pub use composite::{CompositeTask, InnerOutcome, StageKind};
pub use db::{DbOperation, DbTask, InsertRow};
pub use embedding::{EmbeddingTarget, EmbeddingTask, VectorSlot, vector_slot};
