use ferroform::constraint::ConstraintSet;
use ferroform::error::OperatorError;

#[test]
fn constraint_set_preserves_order() {
    let set = ConstraintSet::new(vec![4, 0, 2], 5).unwrap();
    assert_eq!(set.indices(), &[4, 0, 2]);
    assert_eq!(set.len(), 3);
    assert_eq!(set.global_size(), 5);
    assert!(set.contains(2));
    assert!(!set.contains(1));
    assert_eq!(set.membership(), vec![true, false, true, false, true]);
}

#[test]
fn empty_constraint_set() {
    let set = ConstraintSet::empty(3);
    assert!(set.is_empty());
    assert_eq!(set.global_size(), 3);
    assert_eq!(set.membership(), vec![false; 3]);
    assert_eq!(ConstraintSet::new(Vec::new(), 3).unwrap(), set);
}

#[test]
fn constraint_set_rejects_out_of_bounds_index() {
    let result = ConstraintSet::new(vec![0, 5], 5);
    assert!(matches!(result, Err(OperatorError::InvalidArgument { arg: "indices", .. })));
    assert!(ConstraintSet::new(vec![0], 0).is_err());
}

#[test]
fn constraint_set_rejects_repeated_index() {
    let err = ConstraintSet::new(vec![1, 3, 1], 5).unwrap_err();
    assert!(matches!(err, OperatorError::InvalidArgument { .. }));
    assert!(err.to_string().contains("repeated"));
}

#[test]
fn constraint_set_serde_round_trip() {
    let set = ConstraintSet::new(vec![3, 1], 4).unwrap();
    let json = serde_json::to_string(&set).unwrap();
    let deserialized: ConstraintSet = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, set);
}

#[test]
fn constraint_set_deserialization_validates() {
    let repeated = r#"{ "indices": [1, 1], "global_size": 4 }"#;
    assert!(serde_json::from_str::<ConstraintSet>(repeated).is_err());

    let out_of_bounds = r#"{ "indices": [4], "global_size": 4 }"#;
    assert!(serde_json::from_str::<ConstraintSet>(out_of_bounds).is_err());
}
