//! Version reconciliation engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│   Matrix    │────▶│ Classifier  │
//! │ (expected)  │     │  Builder    │     │  (status)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                       ▲         │
//! ┌─────────────┐       │         ▼
//! │   Version   │───────┘   ┌─────────────┐
//! │   Source    │           │ Normalizer  │
//! └─────────────┘           └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`]: Platforms, package kinds, the matrix itself
//! - [`normalize`]: Strips packaging suffixes from version strings
//! - [`matrix`]: Builds the package × (channel, platform) matrix
//! - [`classify`]: Per-cell and per-row status classification

pub mod classify;
pub mod matrix;
pub mod normalize;
pub mod types;

pub use classify::{CellClassification, CellStatus, Classifier, RowClassification, StatusSummary};
pub use matrix::MatrixBuilder;
pub use normalize::normalize;
pub use types::{ABSENT, Cell, Matrix, Package, PackageKind, Platform, Row};
