//! Two writers editing the same sheet concurrently converge once their
//! structural edits are applied in sequencer order.

use pretty_assertions::assert_eq;
use tabula_core::{Command, Model, Placement, SheetId, Value};
use tabula_engine::collab::{SequencedEdit, linearize, rebase_formula};
use tabula_engine::engine::{Axis, EditKind, StructuralEdit};

fn sheet1() -> SheetId {
    SheetId::from("sheet1")
}

fn command_for(edit: &StructuralEdit) -> Command {
    let sheet_id = sheet1();
    match (edit.axis, edit.kind) {
        (Axis::Column, EditKind::Insert) => Command::AddColumns {
            sheet_id,
            column: edit.at,
            position: Placement::Before,
            quantity: edit.count,
        },
        (Axis::Row, EditKind::Insert) => Command::AddRows {
            sheet_id,
            row: edit.at,
            position: Placement::Before,
            quantity: edit.count,
        },
        (Axis::Column, EditKind::Remove) => Command::RemoveColumns {
            sheet_id,
            columns: (edit.at..edit.at + edit.count).collect(),
        },
        (Axis::Row, EditKind::Remove) => Command::RemoveRows {
            sheet_id,
            rows: (edit.at..edit.at + edit.count).collect(),
        },
    }
}

fn replica() -> Model {
    let mut model = Model::new();
    for (col, n) in ["1", "2", "3", "4", "5"].iter().enumerate() {
        model
            .dispatch(Command::update_cell(&sheet1(), col, 0, n))
            .unwrap();
    }
    model
        .dispatch(Command::update_cell(&sheet1(), 5, 0, "=SUM(A1:E1)"))
        .unwrap();
    model
}

fn apply(model: &mut Model, edits: &[SequencedEdit]) {
    for step in linearize(edits) {
        model.dispatch(command_for(&step.edit)).unwrap();
    }
}

#[test]
fn test_replicas_converge_whatever_the_arrival_order() {
    let alice = SequencedEdit::new(1, "alice", "Sheet1", StructuralEdit::insert_columns(0, 1));
    let bob = SequencedEdit::new(1, "bob", "Sheet1", StructuralEdit::remove_columns(2, 1));

    let mut first = replica();
    apply(&mut first, &[alice.clone(), bob.clone()]);
    let mut second = replica();
    apply(&mut second, &[bob, alice]);

    assert_eq!(first.export(), second.export());
    // Bob removed the column holding 3; Alice's new column is empty.
    assert_eq!(first.getters().content(&sheet1(), 5, 0), "=SUM(B1:E1)");
    assert_eq!(first.getters().value(&sheet1(), 5, 0), Value::Number(12.0));
}

#[test]
fn test_split_removal_keeps_the_inserted_column() {
    let insert = SequencedEdit::new(1, "alice", "Sheet1", StructuralEdit::insert_columns(2, 1));
    let remove = SequencedEdit::new(2, "bob", "Sheet1", StructuralEdit::remove_columns(1, 3));

    let mut model = replica();
    apply(&mut model, &[remove, insert]);

    // B, C and D are gone; the column Alice inserted between them survives.
    assert_eq!(model.getters().content(&sheet1(), 0, 0), "1");
    assert_eq!(model.getters().content(&sheet1(), 2, 0), "5");
    assert_eq!(model.getters().value(&sheet1(), 3, 0), Value::Number(6.0));
}

#[test]
fn test_rebased_formula_matches_applied_edits() {
    let edits = [
        SequencedEdit::new(2, "bob", "Sheet1", StructuralEdit::remove_columns(2, 1)),
        SequencedEdit::new(1, "alice", "Sheet1", StructuralEdit::insert_columns(0, 1)),
    ];
    let mut model = replica();
    model
        .dispatch(Command::update_cell(&sheet1(), 0, 1, "=A1+E1"))
        .unwrap();
    apply(&mut model, &edits);

    // A1+E1 was written before either edit; rebasing it lands on the
    // same cells the kernel moved it to.
    let rebased = rebase_formula("=A1+E1", "Sheet1", &edits);
    assert_eq!(rebased, model.getters().content(&sheet1(), 1, 1));
    assert_eq!(model.getters().value(&sheet1(), 1, 1), Value::Number(6.0));
}
