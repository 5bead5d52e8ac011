//! Tests for formula evaluation through the workbook

use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use xlcalc::prelude::*;
use xlcalc::{EvalError, EvaluationContext, FunctionDef, ParseError};

fn number(n: f64) -> FormulaValue {
    FormulaValue::Number(n)
}

/// Test basic formula evaluation without cell references
#[test]
fn test_evaluate_simple_formulas() {
    let mut wb = Workbook::new();

    assert_eq!(wb.evaluate(0, "=1+2*3").unwrap(), number(7.0));
    assert_eq!(
        wb.evaluate(0, "=\"Hello \"&\"World\"").unwrap(),
        FormulaValue::String("Hello World".into())
    );
    assert_eq!(wb.evaluate(0, "=5>3").unwrap(), FormulaValue::Boolean(true));
    assert_eq!(wb.evaluate(0, "=-2^2").unwrap(), number(4.0));
    assert_eq!(wb.evaluate(0, "=50%").unwrap(), number(0.5));
}

#[test]
fn test_evaluate_if_is_lazy() {
    let mut wb = Workbook::new();
    assert_eq!(
        wb.evaluate(0, "=IF(1>0,\"Yes\",1/0)").unwrap(),
        FormulaValue::String("Yes".into())
    );
    assert_eq!(
        wb.evaluate(0, "=IF(1<0,\"Yes\",\"No\")").unwrap(),
        FormulaValue::String("No".into())
    );
    assert_eq!(wb.evaluate(0, "=IF(FALSE,1)").unwrap(), FormulaValue::Boolean(false));
}

/// Test formula evaluation with cell references
#[test]
fn test_evaluate_with_cell_references() {
    let mut wb = Workbook::new();
    wb.set_value(0, "A1", 10.0).unwrap();
    wb.set_value(0, "A2", 20.0).unwrap();
    wb.set_value(0, "A3", 30.0).unwrap();
    wb.set_value(0, "B1", 5.0).unwrap();

    wb.set_formula(0, "C1", "=A1+B1").unwrap();
    wb.set_formula(0, "C2", "=SUM(A1:A3)").unwrap();
    wb.set_formula(0, "C3", "=AVERAGE(A:A)").unwrap();
    wb.set_formula(0, "C4", "=C1*C2").unwrap();

    assert_eq!(wb.evaluate_cell(0, "C1").unwrap(), number(15.0));
    assert_eq!(wb.evaluate_cell(0, "C2").unwrap(), number(60.0));
    assert_eq!(wb.evaluate_cell(0, "C3").unwrap(), number(20.0));
    assert_eq!(wb.evaluate_cell(0, "C4").unwrap(), number(900.0));

    wb.set_value(0, "A1", 0.0).unwrap();
    assert_eq!(wb.evaluate_cell(0, "C4").unwrap(), number(250.0));
}

#[test]
fn test_shared_formula_survives_anchor_clear() {
    let mut wb = Workbook::new();
    for col in ["B", "C", "D"] {
        wb.set_value(0, &format!("{}1", col), 1.0).unwrap();
        wb.set_value(0, &format!("{}2", col), 2.0).unwrap();
    }
    wb.set_shared_formula(0, "B3:D3", "=B1+B2").unwrap();

    for cell in ["B3", "C3", "D3"] {
        assert_eq!(wb.evaluate_cell(0, cell).unwrap(), number(3.0));
    }
    assert_eq!(wb.formula(0, "D3").unwrap().as_deref(), Some("=D1+D2"));

    wb.clear_cell(0, "B3").unwrap();
    assert_eq!(wb.evaluate_cell(0, "B3").unwrap(), FormulaValue::Empty);
    wb.set_value(0, "C1", 10.0).unwrap();
    assert_eq!(wb.evaluate_cell(0, "C3").unwrap(), number(12.0));
    assert_eq!(wb.evaluate_cell(0, "D3").unwrap(), number(3.0));
}

#[test]
fn test_shared_formula_building_on_prior_rows() {
    let mut wb = Workbook::new();
    wb.set_value(0, "A1", 0.0).unwrap();
    wb.set_shared_formula(0, "B1:B3", "=A1+2").unwrap();
    wb.set_formula(0, "A2", "=B1").unwrap();
    wb.set_formula(0, "A3", "=B2").unwrap();

    assert_eq!(wb.evaluate_cell(0, "B1").unwrap(), number(2.0));
    assert_eq!(wb.evaluate_cell(0, "B2").unwrap(), number(4.0));
    assert_eq!(wb.evaluate_cell(0, "B3").unwrap(), number(6.0));
}

#[test]
fn test_multi_sheet_aggregates() {
    let mut wb = Workbook::new();
    wb.add_sheet("Sheet2").unwrap();
    wb.add_sheet("Sheet3").unwrap();
    for (sheet, value) in [(0, 11.0), (1, 22.0), (2, 33.0)] {
        wb.set_value(sheet, "A1", value).unwrap();
    }

    assert_eq!(wb.evaluate(0, "=SUM(Sheet1:Sheet3!A1)").unwrap(), number(66.0));
    assert_eq!(wb.evaluate(0, "=AVERAGE(Sheet1:Sheet3!A1)").unwrap(), number(22.0));
    assert_eq!(wb.evaluate(0, "=COUNT(Sheet2:Sheet3!A1,5)").unwrap(), number(3.0));
    assert_eq!(
        wb.evaluate(0, "=ABS(Sheet1:Sheet3!A1)").unwrap(),
        FormulaValue::Error(CellError::Value)
    );
}

#[test]
fn test_cycle_does_not_poison_other_cells() {
    let mut wb = Workbook::new();
    wb.set_formula(0, "A1", "=A2").unwrap();
    wb.set_formula(0, "A2", "=A1").unwrap();
    wb.set_value(0, "B1", 4.0).unwrap();
    wb.set_formula(0, "C1", "=B1*2").unwrap();

    for cell in ["A1", "A2"] {
        assert!(matches!(
            wb.evaluate_cell(0, cell),
            Err(Error::Eval(EvalError::CircularReference(_)))
        ));
    }
    assert_eq!(wb.evaluate_cell(0, "C1").unwrap(), number(8.0));

    let stats = wb.calculate().unwrap();
    assert_eq!(stats.circular_references, 2);
    assert_eq!(wb.stored_value(0, "C1").unwrap(), &CellValue::Number(8.0));

    // breaking the cycle makes both cells evaluable again
    wb.set_value(0, "A2", 1.0).unwrap();
    assert_eq!(wb.evaluate_cell(0, "A1").unwrap(), number(1.0));
}

#[test]
fn test_deleted_name_target_is_ref_error() {
    let mut wb = Workbook::new();
    wb.define_name("Gone", NameScope::Workbook, "=#REF!*#REF!").unwrap();
    wb.set_formula(0, "A1", "=Gone").unwrap();
    assert_eq!(
        wb.evaluate_cell(0, "A1").unwrap(),
        FormulaValue::Error(CellError::Ref)
    );

    let code = CellError::Ref.code();
    assert_eq!(CellError::from_code(code).map(|e| e.as_str()), Some("#REF!"));
}

#[test]
fn test_totals_row_reference_without_totals_row() {
    let mut wb = Workbook::new();
    wb.add_table(
        TableDef::new(
            "Table1",
            0,
            CellRange::parse("A1:B4").unwrap(),
            true,
            false,
            vec!["Item".into(), "Qty".into()],
        )
        .unwrap(),
    )
    .unwrap();
    wb.set_value(0, "B2", 3.0).unwrap();
    wb.set_value(0, "B3", 4.0).unwrap();

    wb.set_formula(0, "D1", "=Table1[#Totals]").unwrap();
    wb.set_formula(0, "D2", "=Table1[[#Totals],[Qty]]").unwrap();
    wb.set_formula(0, "D3", "=SUM(Table1[Qty])").unwrap();

    assert_eq!(wb.formula(0, "D1").unwrap().as_deref(), Some("=#REF!"));
    assert_eq!(wb.formula(0, "D2").unwrap().as_deref(), Some("=#REF!"));
    assert_eq!(
        wb.evaluate_cell(0, "D1").unwrap(),
        FormulaValue::Error(CellError::Ref)
    );
    assert_eq!(wb.evaluate_cell(0, "D3").unwrap(), number(7.0));
}

#[test]
fn test_this_row_reference() {
    let mut wb = Workbook::new();
    wb.add_table(
        TableDef::new(
            "Prices",
            0,
            CellRange::parse("A1:B3").unwrap(),
            true,
            false,
            vec!["Qty".into(), "Price".into()],
        )
        .unwrap(),
    )
    .unwrap();
    wb.set_value(0, "A2", 2.0).unwrap();
    wb.set_value(0, "B2", 1.5).unwrap();
    wb.set_value(0, "A3", 4.0).unwrap();
    wb.set_value(0, "B3", 2.5).unwrap();

    wb.set_formula(0, "C2", "=Prices[@Qty]*Prices[@Price]").unwrap();
    wb.set_formula(0, "C3", "=Prices[@Qty]*Prices[@Price]").unwrap();
    assert_eq!(wb.evaluate_cell(0, "C2").unwrap(), number(3.0));
    assert_eq!(wb.evaluate_cell(0, "C3").unwrap(), number(10.0));
}

fn prices_table(wb: &mut Workbook) {
    wb.add_table(
        TableDef::new(
            "Prices",
            0,
            CellRange::parse("A1:B3").unwrap(),
            true,
            false,
            vec!["Qty".into(), "Price".into()],
        )
        .unwrap(),
    )
    .unwrap();
    wb.set_value(0, "A2", 2.0).unwrap();
    wb.set_value(0, "A3", 4.0).unwrap();
}

#[test]
fn test_this_row_follows_each_shared_member() {
    let mut wb = Workbook::new();
    prices_table(&mut wb);
    wb.set_shared_formula(0, "C2:C3", "=Prices[@Qty]*10").unwrap();

    assert_eq!(wb.evaluate_cell(0, "C2").unwrap(), number(20.0));
    assert_eq!(wb.evaluate_cell(0, "C3").unwrap(), number(40.0));
    assert_eq!(wb.formula(0, "C3").unwrap().as_deref(), Some("=Prices[@Qty]*10"));

    wb.insert_rows(0, 0, 1).unwrap();
    assert_eq!(wb.evaluate_cell(0, "C3").unwrap(), number(20.0));
    assert_eq!(wb.evaluate_cell(0, "C4").unwrap(), number(40.0));
    assert_eq!(wb.formula(0, "C4").unwrap().as_deref(), Some("=Prices[@Qty]*10"));

    // a row inserted inside the table gets its own current row
    wb.insert_rows(0, 3, 1).unwrap();
    wb.set_value(0, "A4", 3.0).unwrap();
    wb.set_formula(0, "C4", "=Prices[@Qty]*10").unwrap();
    assert_eq!(wb.evaluate_cell(0, "C4").unwrap(), number(30.0));
    assert_eq!(wb.evaluate_cell(0, "C5").unwrap(), number(40.0));
}

#[test]
fn test_this_row_outside_table_is_ref_error() {
    let mut wb = Workbook::new();
    prices_table(&mut wb);
    wb.set_formula(0, "C1", "=Prices[@Qty]").unwrap();
    wb.set_formula(0, "C9", "=Prices[[#This Row],[Price]]").unwrap();
    wb.set_formula(0, "D9", "=ISREF(Prices[@])").unwrap();

    assert_eq!(wb.evaluate_cell(0, "C1").unwrap(), FormulaValue::Error(CellError::Ref));
    assert_eq!(wb.evaluate_cell(0, "C9").unwrap(), FormulaValue::Error(CellError::Ref));
    assert_eq!(wb.evaluate_cell(0, "D9").unwrap(), FormulaValue::Boolean(false));

    // the same text entered on a table row reads that row
    wb.set_value(0, "B3", 2.5).unwrap();
    wb.set_formula(0, "C3", "=Prices[[#This Row],[Price]]").unwrap();
    assert_eq!(wb.evaluate_cell(0, "C3").unwrap(), number(2.5));
}

static CALLS: AtomicUsize = AtomicUsize::new(0);

fn tally(_args: &[FormulaValue], _ctx: &EvaluationContext) -> xlcalc::FormulaResult<FormulaValue> {
    CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(FormulaValue::Number(1.0))
}

#[test]
fn test_fresh_cell_is_not_reevaluated() {
    let mut wb = Workbook::new();
    wb.engine_mut()
        .registry_mut()
        .register(FunctionDef::new("TALLY", 0, Some(0), tally));
    wb.set_value(0, "A1", 41.0).unwrap();
    wb.set_formula(0, "B1", "=A1+TALLY()").unwrap();

    let before = CALLS.load(Ordering::SeqCst);
    assert_eq!(wb.evaluate_cell(0, "B1").unwrap(), number(42.0));
    assert_eq!(wb.evaluate_cell(0, "B1").unwrap(), number(42.0));
    wb.calculate().unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst) - before, 1);

    wb.set_value(0, "A1", 1.0).unwrap();
    assert_eq!(wb.evaluate_cell(0, "B1").unwrap(), number(2.0));
    assert_eq!(CALLS.load(Ordering::SeqCst) - before, 2);
}

#[test]
fn test_unregistered_function_can_be_registered_later() {
    fn triple(args: &[FormulaValue], _ctx: &EvaluationContext) -> xlcalc::FormulaResult<FormulaValue> {
        Ok(FormulaValue::Number(args[0].as_number().unwrap_or(0.0) * 3.0))
    }

    let mut wb = Workbook::new();
    wb.set_formula(0, "A1", "=TRIPLE(2)").unwrap();
    assert!(matches!(
        wb.evaluate_cell(0, "A1"),
        Err(Error::Eval(EvalError::UnregisteredFunction(_)))
    ));

    wb.engine_mut()
        .registry_mut()
        .register(FunctionDef::new("TRIPLE", 1, Some(1), triple));
    assert_eq!(wb.evaluate_cell(0, "A1").unwrap(), number(6.0));
}

#[test]
fn test_external_workbook_values() {
    let mut other = Workbook::new();
    other.set_value(0, "A1", 7.0).unwrap();
    other.define_name("Rate", NameScope::Workbook, "=3").unwrap();

    let mut wb = Workbook::new();
    let link = wb.link_external("Book2.xlsx", Some(other));
    assert_eq!(link, 1);
    wb.set_formula(0, "A1", "=[Book2.xlsx]Sheet1!A1*2").unwrap();
    wb.set_formula(0, "A2", "=[1]Sheet1!A1+[1]!Rate").unwrap();
    wb.set_formula(0, "A3", "=[1]Missing!A1").unwrap();

    assert_eq!(wb.evaluate_cell(0, "A1").unwrap(), number(14.0));
    assert_eq!(wb.evaluate_cell(0, "A2").unwrap(), number(10.0));
    assert_eq!(
        wb.evaluate_cell(0, "A3").unwrap(),
        FormulaValue::Error(CellError::Ref)
    );

    wb.with_linked_book(1, |book| book.set_value(0, "A1", 1.0)).unwrap().unwrap();
    assert_eq!(wb.evaluate_cell(0, "A1").unwrap(), number(2.0));

    assert!(matches!(
        wb.set_formula(0, "B1", "=[Book9.xlsx]Sheet1!A1"),
        Err(Error::Parse(ParseError::UnknownExternalBook { .. }))
    ));
}

#[test]
fn test_array_formula_elements() {
    let mut wb = Workbook::new();
    wb.set_value(0, "A1", 1.0).unwrap();
    wb.set_value(0, "A2", 2.0).unwrap();
    wb.set_value(0, "A3", 3.0).unwrap();
    wb.set_array_formula(0, "B1:B3", "=A1:A3*A1:A3").unwrap();

    assert_eq!(wb.evaluate_cell(0, "B2").unwrap(), number(4.0));
    assert_eq!(wb.evaluate_cell(0, "B3").unwrap(), number(9.0));
    assert!(matches!(
        wb.set_value(0, "B2", 0.0),
        Err(Error::Edit(xlcalc::EditError::SplitsArrayFormula(_)))
    ));
}

proptest! {
    #[test]
    fn prop_sum_matches_cells(values in proptest::collection::vec(-1000i32..1000, 1..20)) {
        let mut wb = Workbook::new();
        for (i, v) in values.iter().enumerate() {
            wb.set_value(0, &format!("A{}", i + 1), *v as f64).unwrap();
        }
        wb.set_formula(0, "B1", "=SUM(A:A)").unwrap();
        let expected: i32 = values.iter().sum();
        prop_assert_eq!(wb.evaluate_cell(0, "B1").unwrap(), FormulaValue::Number(expected as f64));
    }
}
