//! End-to-end behaviour of the command kernel.

use pretty_assertions::assert_eq;
use tabula_core::model::Header;
use tabula_core::{
    CancelledReason, CellError, Command, Model, Placement, SheetId, Style, Value, Zone,
};
use tabula_engine::engine::EvalState;

fn sheet1() -> SheetId {
    SheetId::from("sheet1")
}

fn set(model: &mut Model, xc: &str, content: &str) {
    let (col, row) = tabula_engine::engine::to_cartesian(xc).unwrap();
    model
        .dispatch(Command::update_cell(&sheet1(), col, row, content))
        .unwrap();
}

fn value(model: &Model, xc: &str) -> Value {
    let (col, row) = tabula_engine::engine::to_cartesian(xc).unwrap();
    model.getters().value(&sheet1(), col, row)
}

fn content<'a>(model: &'a Model, xc: &str) -> &'a str {
    let (col, row) = tabula_engine::engine::to_cartesian(xc).unwrap();
    model.getters().content(&sheet1(), col, row)
}

#[test]
fn test_removing_a_column_shrinks_ranges() {
    let mut model = Model::new();
    set(&mut model, "B1", "1");
    set(&mut model, "C1", "2");
    set(&mut model, "D1", "3");
    set(&mut model, "A2", "=SUM(B1:D1)");
    assert_eq!(value(&model, "A2"), Value::Number(6.0));

    model
        .dispatch(Command::RemoveColumns {
            sheet_id: sheet1(),
            columns: vec![1],
        })
        .unwrap();
    assert_eq!(content(&model, "A2"), "=SUM(B1:C1)");
    assert_eq!(value(&model, "A2"), Value::Number(5.0));
}

#[test]
fn test_removing_a_referenced_row_gives_ref_error() {
    let mut model = Model::new();
    set(&mut model, "B3", "4");
    set(&mut model, "A1", "=B3*2");
    set(&mut model, "A2", "=A1+1");

    model
        .dispatch(Command::RemoveRows {
            sheet_id: sheet1(),
            rows: vec![2],
        })
        .unwrap();
    assert_eq!(content(&model, "A1"), "=#REF*2");
    assert_eq!(value(&model, "A1"), Value::Error(CellError::Ref));
    assert_eq!(value(&model, "A2"), Value::Error(CellError::Ref));

    model.dispatch(Command::Undo).unwrap();
    assert_eq!(content(&model, "A1"), "=B3*2");
    assert_eq!(value(&model, "A2"), Value::Number(9.0));
}

#[test]
fn test_inserted_columns_are_named_past_z() {
    let mut model = Model::new();
    model
        .dispatch(Command::AddColumns {
            sheet_id: sheet1(),
            column: 25,
            position: Placement::After,
            quantity: 3,
        })
        .unwrap();
    let names: Vec<&str> = model.getters().col_headers(&sheet1())[24..]
        .iter()
        .map(|h: &Header| h.name.as_str())
        .collect();
    assert_eq!(names, vec!["Y", "Z", "AA", "AB", "AC"]);
}

#[test]
fn test_inserted_rows_move_cells_and_formulas() {
    let mut model = Model::new();
    set(&mut model, "A1", "10");
    set(&mut model, "A2", "=A1*3");
    model
        .dispatch(Command::AddRows {
            sheet_id: sheet1(),
            row: 0,
            position: Placement::Before,
            quantity: 2,
        })
        .unwrap();
    assert_eq!(content(&model, "A3"), "10");
    assert_eq!(content(&model, "A4"), "=A3*3");
    assert_eq!(value(&model, "A4"), Value::Number(30.0));
    assert_eq!(model.getters().dimensions(&sheet1()), (26, 102));
}

#[test]
fn test_every_step_undoes_to_the_start() {
    let mut model = Model::new();
    let start = model.export();
    let commands = vec![
        Command::update_cell(&sheet1(), 0, 0, "1"),
        Command::update_cell(&sheet1(), 1, 0, "=A1+1"),
        Command::AddMerge {
            sheet_id: sheet1(),
            zone: Zone::parse("C3:D5").unwrap(),
            force: false,
        },
        Command::SetFormatting {
            sheet_id: sheet1(),
            target: vec![Zone::parse("A1:B1").unwrap()],
            style: Style {
                bold: Some(true),
                ..Style::default()
            },
        },
        Command::AddColumns {
            sheet_id: sheet1(),
            column: 0,
            position: Placement::Before,
            quantity: 2,
        },
        Command::CreateSheet {
            sheet_id: "s2".into(),
            name: Some("Totals".into()),
            position: 1,
            cols: Some(5),
            rows: Some(5),
            activate: true,
        },
        Command::update_cell(&"s2".into(), 0, 0, "=Sheet1!D1*10"),
        Command::RenameSheet {
            sheet_id: sheet1(),
            name: "Data".into(),
        },
    ];
    let count = commands.len();
    for command in commands {
        model.dispatch(command).unwrap();
    }
    assert_eq!(model.getters().content(&"s2".into(), 0, 0), "=Data!D1*10");
    assert_eq!(model.getters().value(&"s2".into(), 0, 0), Value::Number(20.0));
    let end = model.export();

    for _ in 0..count {
        model.dispatch(Command::Undo).unwrap();
    }
    assert_eq!(model.dispatch(Command::Undo), Err(CancelledReason::EmptyUndoStack));
    assert_eq!(model.export(), start);

    for _ in 0..count {
        model.dispatch(Command::Redo).unwrap();
    }
    assert_eq!(model.export(), end);
    assert_eq!(model.getters().value(&"s2".into(), 0, 0), Value::Number(20.0));
}

#[test]
fn test_new_command_clears_redo() {
    let mut model = Model::new();
    set(&mut model, "A1", "1");
    model.dispatch(Command::Undo).unwrap();
    assert!(model.getters().can_redo());
    set(&mut model, "A2", "2");
    assert!(!model.getters().can_redo());
    assert_eq!(model.dispatch(Command::Redo), Err(CancelledReason::EmptyRedoStack));
}

#[test]
fn test_merged_zone_formatting_survives_unmerge() {
    let mut model = Model::new();
    let zone = Zone::parse("B2:C3").unwrap();
    model
        .dispatch(Command::AddMerge {
            sheet_id: sheet1(),
            zone,
            force: false,
        })
        .unwrap();
    model
        .dispatch(Command::SetFormatting {
            sheet_id: sheet1(),
            target: vec![zone],
            style: Style {
                fill_color: Some("#336699".into()),
                ..Style::default()
            },
        })
        .unwrap();
    model
        .dispatch(Command::RemoveMerge {
            sheet_id: sheet1(),
            zone,
        })
        .unwrap();
    let getters = model.getters();
    for position in zone.positions() {
        let style = getters.cell_style(&sheet1(), position.col, position.row);
        assert_eq!(style.and_then(|s| s.fill_color.as_deref()), Some("#336699"));
    }
}

#[test]
fn test_cycles_are_reported_not_looped() {
    let mut model = Model::new();
    set(&mut model, "A1", "=B1+1");
    set(&mut model, "B1", "=C1+1");
    set(&mut model, "C1", "=A1+1");
    set(&mut model, "D1", "=D1");
    for xc in ["A1", "B1", "C1", "D1"] {
        assert_eq!(value(&model, xc), Value::Error(CellError::Cycle), "{xc}");
    }
    set(&mut model, "C1", "5");
    assert_eq!(value(&model, "A1"), Value::Number(7.0));
}

#[test]
fn test_async_results_reach_dependents() {
    let mut model = Model::new();
    set(&mut model, "A1", "=WAIT(10)");
    set(&mut model, "B1", "=A1*2");
    assert_eq!(
        model.getters().eval_state(&sheet1(), 0, 0),
        Some(EvalState::PendingAsync)
    );
    assert_eq!(model.getters().pending_async(), 1);

    while model.getters().pending_async() > 0 {
        model.wait_for_async();
    }
    assert_eq!(value(&model, "A1"), Value::Number(10.0));
    assert_eq!(value(&model, "B1"), Value::Number(20.0));
    assert_eq!(model.process_async(), 0);
}

#[test]
fn test_replaced_async_formula_drops_stale_result() {
    let mut model = Model::new();
    set(&mut model, "A1", "=WAIT(10)");
    set(&mut model, "A1", "=3");
    assert_eq!(value(&model, "A1"), Value::Number(3.0));
    while model.getters().pending_async() > 0 {
        if model.wait_for_async() == 0 {
            break;
        }
    }
    assert_eq!(value(&model, "A1"), Value::Number(3.0));
}

#[test]
fn test_export_import_round_trip() {
    let mut model = Model::new();
    set(&mut model, "A1", "3");
    set(&mut model, "A2", "=A1*A1");
    model
        .dispatch(Command::AddMerge {
            sheet_id: sheet1(),
            zone: Zone::parse("D4:E6").unwrap(),
            force: false,
        })
        .unwrap();
    model
        .dispatch(Command::ResizeRows {
            sheet_id: sheet1(),
            rows: vec![0, 3],
            size: 40,
        })
        .unwrap();
    model
        .dispatch(Command::DuplicateSheet {
            sheet_id_from: sheet1(),
            sheet_id_to: "copy".into(),
            name: None,
        })
        .unwrap();

    let json = model.to_json().unwrap();
    let restored = Model::from_json(&json, Default::default()).unwrap();
    assert_eq!(restored.export(), model.export());

    let getters = restored.getters();
    assert_eq!(getters.value(&"copy".into(), 0, 1), Value::Number(9.0));
    assert_eq!(getters.sheet_name(&"copy".into()), Some("Copy of Sheet1"));
    assert_eq!(getters.merges(&"copy".into()), vec![Zone::parse("D4:E6").unwrap()]);
    assert_eq!(getters.row_headers(&sheet1())[3].size, 40);
}

#[test]
fn test_deeply_nested_formula_is_an_error_value() {
    let mut model = Model::new();
    let depth = 5000;
    let formula = format!("={}1{}", "(".repeat(depth), ")".repeat(depth));
    set(&mut model, "A1", &formula);
    set(&mut model, "B1", "=A1+1");
    assert_eq!(value(&model, "A1"), Value::Error(CellError::Error));
    assert_eq!(value(&model, "B1"), Value::Error(CellError::Error));

    set(&mut model, "A1", "=((1))");
    assert_eq!(value(&model, "B1"), Value::Number(2.0));
}
