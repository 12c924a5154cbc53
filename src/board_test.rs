use super::*;

fn stroke(points: Vec<f64>) -> Stroke {
    Stroke { id: Uuid::new_v4(), points, color: "#2563EB".into(), size: 3.0 }
}

fn note(text: &str) -> StickyNote {
    StickyNote {
        id: Uuid::new_v4(),
        x: 10.0,
        y: 10.0,
        text: text.into(),
        color: "#FFEAA7".into(),
        width: 150.0,
        height: 100.0,
    }
}

#[test]
fn append_preserves_z_order() {
    let mut board = Board::new();
    let first = stroke(vec![0.0, 0.0, 5.0, 5.0]);
    let second = stroke(vec![1.0, 1.0, 6.0, 6.0]);
    board.append_stroke(first.clone());
    board.append_stroke(second.clone());

    assert_eq!(board.strokes().len(), 2);
    assert_eq!(board.strokes()[0].id, first.id);
    assert_eq!(board.strokes()[1].id, second.id);
}

#[test]
fn short_stroke_is_accepted_inert() {
    let mut board = Board::new();
    board.append_stroke(stroke(vec![4.0, 2.0]));
    assert_eq!(board.strokes().len(), 1);
}

#[test]
fn remove_stroke_returns_prior_position() {
    let mut board = Board::new();
    let a = stroke(vec![0.0, 0.0, 1.0, 1.0]);
    let b = stroke(vec![2.0, 2.0, 3.0, 3.0]);
    board.append_stroke(a);
    board.append_stroke(b.clone());

    let (index, removed) = board.remove_stroke(b.id).expect("stroke exists");
    assert_eq!(index, 1);
    assert_eq!(removed.id, b.id);
    assert!(board.remove_stroke(b.id).is_none());
}

#[test]
fn insert_stroke_clamps_out_of_range_index() {
    let mut board = Board::new();
    board.insert_stroke(99, stroke(vec![0.0, 0.0, 1.0, 1.0]));
    assert_eq!(board.strokes().len(), 1);
}

#[test]
fn update_note_merges_only_supplied_fields() {
    let mut board = Board::new();
    let n = note("hello");
    let id = n.id;
    board.append_note(n);

    let patch = NotePatch { x: Some(50.0), y: Some(60.0), ..NotePatch::default() };
    let prior = board.update_note(id, &patch).expect("note exists");

    let updated = board.note(id).expect("note exists");
    assert!((updated.x - 50.0).abs() < f64::EPSILON);
    assert!((updated.y - 60.0).abs() < f64::EPSILON);
    assert_eq!(updated.text, "hello"); // untouched

    // Inverse patch carries exactly the prior values of the supplied fields.
    assert_eq!(prior.x, Some(10.0));
    assert_eq!(prior.y, Some(10.0));
    assert!(prior.text.is_none());
}

#[test]
fn update_vanished_note_is_silent_noop() {
    let mut board = Board::new();
    let patch = NotePatch { text: Some("ghost".into()), ..NotePatch::default() };
    assert!(board.update_note(Uuid::new_v4(), &patch).is_none());
    assert!(board.notes().is_empty()); // never recreated
}

#[test]
fn empty_patch_is_noop() {
    let mut board = Board::new();
    let n = note("keep");
    let id = n.id;
    board.append_note(n.clone());

    assert!(NotePatch::default().is_empty());
    let prior = board.update_note(id, &NotePatch::default()).expect("note exists");
    assert!(prior.is_empty());
    assert_eq!(board.note(id), Some(&n));
}

#[test]
fn delete_note_is_idempotent() {
    let mut board = Board::new();
    let n = note("once");
    let id = n.id;
    board.append_note(n);

    assert!(board.remove_note(id).is_some());
    assert!(board.remove_note(id).is_none());
    assert!(board.notes().is_empty());
}

#[test]
fn clear_all_drains_both_collections() {
    let mut board = Board::new();
    board.append_stroke(stroke(vec![0.0, 0.0, 1.0, 1.0]));
    board.append_note(note("a"));
    board.append_note(note("b"));

    let (strokes, notes) = board.clear_all();
    assert_eq!(strokes.len(), 1);
    assert_eq!(notes.len(), 2);
    assert!(board.is_empty());

    board.restore(strokes, notes);
    assert_eq!(board.strokes().len(), 1);
    assert_eq!(board.notes().len(), 2);
}
