//! Workbook calculation
//!
//! Walks the engine's calculation chain, then writes every outcome back to
//! the worksheets so that stored values match the formulas.
//!
//! # Example
//!
//! ```rust
//! use xlcalc::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! workbook.set_value(0, "A1", 10.0).unwrap();
//! workbook.set_value(0, "A2", 20.0).unwrap();
//! workbook.set_formula(0, "A3", "=A1+A2").unwrap();
//!
//! let stats = workbook.calculate().unwrap();
//! assert_eq!(stats.cells_calculated, 1);
//! assert_eq!(workbook.stored_value(0, "A3").unwrap(), &CellValue::Number(30.0));
//! ```

use std::ops::ControlFlow;

use tracing::{debug, warn};
use xlcalc_core::CellValue;
use xlcalc_formula::cache::Outcome;
use xlcalc_formula::{CellKey, ChainEntry, EvalError};

use crate::error::Result;
use crate::workbook::Workbook;

/// Options for workbook calculation
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Recalculate every formula, even those with a current value
    pub force_full_calculation: bool,
    /// Recalculate volatile formulas (NOW, TODAY, RAND, ...) on every pass
    pub calculate_volatile: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            force_full_calculation: false,
            calculate_volatile: true,
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Formula cells in the calculation chain
    pub formula_count: usize,
    /// Cells evaluated on this pass rather than served from the cache
    pub cells_calculated: usize,
    /// Cells found on a circular reference
    pub circular_references: usize,
    /// Volatile cells visited
    pub volatile_cells: usize,
    /// Cells whose value is an Excel error or that failed to evaluate
    pub errors: usize,
}

/// Extension trait for Workbook to add calculation methods
pub trait WorkbookCalculationExt {
    /// Calculate all formulas in the workbook with default options
    fn calculate(&mut self) -> Result<CalculationStats>;

    /// Calculate all formulas with custom options
    fn calculate_with_options(&mut self, options: &CalculationOptions) -> Result<CalculationStats>;

    /// Calculate, handing each chain entry to `visit`; stops when it breaks
    fn calculate_with<F>(&mut self, options: &CalculationOptions, visit: F) -> Result<CalculationStats>
    where
        F: FnMut(ChainEntry<'_>) -> ControlFlow<()>;
}

impl WorkbookCalculationExt for Workbook {
    fn calculate(&mut self) -> Result<CalculationStats> {
        self.calculate_with_options(&CalculationOptions::default())
    }

    fn calculate_with_options(&mut self, options: &CalculationOptions) -> Result<CalculationStats> {
        self.calculate_with(options, |_| ControlFlow::Continue(()))
    }

    fn calculate_with<F>(&mut self, options: &CalculationOptions, mut visit: F) -> Result<CalculationStats>
    where
        F: FnMut(ChainEntry<'_>) -> ControlFlow<()>,
    {
        if options.force_full_calculation {
            self.engine.invalidate_all();
        }
        let recalc_volatile = self.engine.options().recalc_volatile;
        self.engine.options_mut().recalc_volatile = options.calculate_volatile;

        let mut stats = CalculationStats {
            formula_count: self.engine.chain().count(),
            ..CalculationStats::default()
        };
        let mut results: Vec<(CellKey, Outcome)> = Vec::new();
        self.engine.calculate_with(&self.data, |entry| {
            if entry.recalculated {
                stats.cells_calculated += 1;
            }
            if entry.volatile {
                stats.volatile_cells += 1;
            }
            match entry.outcome {
                Ok(v) if v.is_error() => stats.errors += 1,
                Ok(_) => {}
                Err(EvalError::CircularReference(_)) => stats.circular_references += 1,
                Err(_) => stats.errors += 1,
            }
            results.push((entry.cell, entry.outcome.clone()));
            visit(entry)
        });
        self.engine.options_mut().recalc_volatile = recalc_volatile;

        for (cell, outcome) in results {
            self.store_outcome(cell, outcome)?;
        }
        debug!(
            formulas = stats.formula_count,
            calculated = stats.cells_calculated,
            circular = stats.circular_references,
            errors = stats.errors,
            "calculation finished"
        );
        Ok(stats)
    }
}

impl Workbook {
    /// Write an outcome to the worksheet; array results fill their range
    fn store_outcome(&mut self, cell: CellKey, outcome: Outcome) -> Result<()> {
        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                warn!(cell = %cell, error = %e, "formula has no value");
                self.data.sheets[cell.sheet].clear_at(cell.row, cell.col);
                return Ok(());
            }
        };
        let array = self.engine.array_range(cell.sheet, cell.row, cell.col);
        let sheet = &mut self.data.sheets[cell.sheet];
        match array {
            Some(range) => {
                for (i, row) in (range.start.row..=range.end.row).enumerate() {
                    for (j, col) in (range.start.col..=range.end.col).enumerate() {
                        sheet.set_value_at(row, col, CellValue::from(value.element(i, j)))?;
                    }
                }
            }
            None => sheet.set_value_at(cell.row, cell.col, CellValue::from(value.first().clone()))?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xlcalc_core::CellError;

    #[test]
    fn test_stats_count_fresh_cells_once() {
        let mut book = Workbook::new();
        book.set_value(0, "A1", 1.0).unwrap();
        book.set_formula(0, "B1", "=A1+1").unwrap();
        book.set_formula(0, "C1", "=B1*2").unwrap();

        let first = book.calculate().unwrap();
        assert_eq!(first.formula_count, 2);
        assert_eq!(first.cells_calculated, 2);

        let second = book.calculate().unwrap();
        assert_eq!(second.cells_calculated, 0);

        let forced = book
            .calculate_with_options(&CalculationOptions {
                force_full_calculation: true,
                ..CalculationOptions::default()
            })
            .unwrap();
        assert_eq!(forced.cells_calculated, 2);
        assert_eq!(book.stored_value(0, "C1").unwrap(), &CellValue::Number(4.0));
    }

    #[test]
    fn test_errors_and_cycles_counted() {
        let mut book = Workbook::new();
        book.set_formula(0, "A1", "=1/0").unwrap();
        book.set_formula(0, "B1", "=C1").unwrap();
        book.set_formula(0, "C1", "=B1").unwrap();

        let stats = book.calculate().unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.circular_references, 2);
        assert_eq!(
            book.stored_value(0, "A1").unwrap(),
            &CellValue::Error(CellError::Div0)
        );
        assert_eq!(book.stored_value(0, "B1").unwrap(), &CellValue::Empty);
    }

    #[test]
    fn test_array_result_written_to_range() {
        let mut book = Workbook::new();
        book.set_array_formula(0, "A1:B2", "={1,2;3,4}*10").unwrap();
        book.calculate().unwrap();
        assert_eq!(book.stored_value(0, "B1").unwrap(), &CellValue::Number(20.0));
        assert_eq!(book.stored_value(0, "A2").unwrap(), &CellValue::Number(30.0));
    }

    #[test]
    fn test_visit_can_stop_early() {
        let mut book = Workbook::new();
        for row in 1..=5 {
            book.set_formula(0, &format!("A{}", row), "=1").unwrap();
        }
        let mut seen = 0;
        let stats = book
            .calculate_with(&CalculationOptions::default(), |_| {
                seen += 1;
                if seen == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(stats.cells_calculated, 2);
    }
}
