//! Status classification of matrix cells and rows

use std::collections::HashSet;

use thiserror::Error;

use crate::config::StatusConfig;
use crate::status::types::{Cell, Matrix, PackageKind, Row};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("Channel {0} is not part of the matrix")]
    UnknownChannel(String),
}

/// Status of one (package, channel, platform) cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellStatus {
    /// Present with the expected version
    Current,
    /// Present with a different version
    Outdated,
    /// Expected but absent
    Missing,
    /// Absent, and no version is expected
    MissingNoExpectation,
    /// Present, but there is no expected version to compare against
    UnclassifiedPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellClassification {
    pub status: CellStatus,
    /// Absent here while present in the reference channel
    pub regression: bool,
}

/// Classification of one matrix row, cells in matrix order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowClassification {
    pub cells: Vec<CellClassification>,
    /// The row does not hold the same versions on every platform
    pub differs_across_platforms: bool,
    /// Per platform: the propagation channels disagree
    pub changing_on_propagation: Vec<bool>,
}

impl RowClassification {
    pub fn is_changing_on_propagation(&self) -> bool {
        self.changing_on_propagation.iter().any(|&changing| changing)
    }

    pub fn has_regression(&self) -> bool {
        self.cells.iter().any(|cell| cell.regression)
    }
}

/// Classify a cell against the expected version
pub fn classify_cell(latest: Option<&str>, cell: Option<&str>) -> CellStatus {
    match (latest, cell) {
        (None, None) => CellStatus::MissingNoExpectation,
        (None, Some(_)) => CellStatus::UnclassifiedPresent,
        (Some(_), None) => CellStatus::Missing,
        (Some(latest), Some(version)) if latest == version => CellStatus::Current,
        (Some(_), Some(_)) => CellStatus::Outdated,
    }
}

/// A package present in the reference channel but absent from another one
pub fn is_regression(cell: Option<&str>, reference: Option<&str>) -> bool {
    reference.is_some() && cell.is_none()
}

/// Derives cell and row status from a built matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    reference: usize,
    propagation: Option<(usize, usize)>,
}

impl Classifier {
    /// # Arguments
    /// * `channels` - channel order of the matrix to classify
    /// * `reference` - channel whose entries others must not lose
    /// * `propagation` - pair of channels compared to detect drift
    pub fn new(
        channels: &[String],
        reference: &str,
        propagation: Option<(&str, &str)>,
    ) -> Result<Self, ClassifyError> {
        let position = |name: &str| {
            channels
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| ClassifyError::UnknownChannel(name.to_string()))
        };

        let reference = position(reference)?;
        let propagation = match propagation {
            Some((from, to)) => Some((position(from)?, position(to)?)),
            None => None,
        };

        Ok(Self {
            reference,
            propagation,
        })
    }

    pub fn from_config(config: &StatusConfig) -> Result<Self, ClassifyError> {
        Self::new(
            &config.channels,
            config.reference_channel(),
            config.propagation_pair(),
        )
    }

    /// Classify every row of the matrix, in row order
    pub fn classify(&self, matrix: &Matrix) -> Vec<RowClassification> {
        matrix
            .rows()
            .iter()
            .map(|row| self.classify_row(matrix, row))
            .collect()
    }

    pub fn classify_row(&self, matrix: &Matrix, row: &Row) -> RowClassification {
        let width = matrix.channels().len();
        let mut cells = Vec::with_capacity(row.cells.len());
        let mut changing_on_propagation = Vec::with_capacity(matrix.platforms().len());
        let mut distinct_columns: HashSet<&[Cell]> = HashSet::new();

        for (p, platform) in matrix.platforms().iter().enumerate() {
            let column = matrix.column(row, p);

            // No source entry is expected for binary-only packages
            let expects_source = row.kind == PackageKind::SourceBuilt;
            let latest = if platform.is_source() && row.kind == PackageKind::Prebuilt {
                None
            } else {
                row.version.as_deref()
            };

            let reference = column.get(self.reference).and_then(|c| c.as_deref());
            for (c, cell) in column.iter().enumerate() {
                let cell = cell.as_deref();
                cells.push(CellClassification {
                    status: classify_cell(latest, cell),
                    regression: c != self.reference && is_regression(cell, reference),
                });
            }

            changing_on_propagation.push(match self.propagation {
                Some((from, to)) if from < width && to < width => column[from] != column[to],
                _ => false,
            });

            if !platform.is_source() || expects_source {
                distinct_columns.insert(column);
            }
        }

        RowClassification {
            cells,
            differs_across_platforms: distinct_columns.len() > 1,
            changing_on_propagation,
        }
    }
}

/// Cell counts per status over a whole matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub current: usize,
    pub outdated: usize,
    pub missing: usize,
    pub missing_no_expectation: usize,
    pub unclassified_present: usize,
    pub regressions: usize,
    pub rows_differing: usize,
    pub rows_propagating: usize,
}

impl StatusSummary {
    pub fn from_rows(rows: &[RowClassification]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            for cell in &row.cells {
                match cell.status {
                    CellStatus::Current => summary.current += 1,
                    CellStatus::Outdated => summary.outdated += 1,
                    CellStatus::Missing => summary.missing += 1,
                    CellStatus::MissingNoExpectation => summary.missing_no_expectation += 1,
                    CellStatus::UnclassifiedPresent => summary.unclassified_present += 1,
                }
                if cell.regression {
                    summary.regressions += 1;
                }
            }
            if row.differs_across_platforms {
                summary.rows_differing += 1;
            }
            if row.is_changing_on_propagation() {
                summary.rows_propagating += 1;
            }
        }
        summary
    }
}
