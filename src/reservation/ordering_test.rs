use std::cmp::Ordering;

use super::ordering::*;
use crate::CoordinationError;
use crate::Error;
use crate::ReservationKind;

#[test]
fn test_sequence_of_parses_padded_suffix() {
    assert_eq!(sequence_of("EX_0000000042").unwrap(), 42);
    assert_eq!(sequence_of("/base/coord/lock/a/SH_0000000007").unwrap(), 7);
}

#[test]
fn test_compare_ignores_kind_prefix() {
    assert_eq!(compare("SH_0000000001", "EX_0000000002").unwrap(), Ordering::Less);
    assert_eq!(compare("EX_0000000009", "SH_0000000003").unwrap(), Ordering::Greater);
}

#[test]
fn test_compare_is_numeric_for_unpadded_suffixes() {
    // Lexicographic order would put "10" before "9"
    assert_eq!(compare("EX_9", "EX_10").unwrap(), Ordering::Less);
}

#[test]
fn test_malformed_names_are_fatal() {
    for name in ["EX", "EX_", "EX_12a", "no-delimiter", "EX_-1"] {
        let err = sequence_of(name).unwrap_err();
        assert!(
            matches!(
                err,
                Error::Coordination(CoordinationError::MalformedReservationName(ref n)) if n == name
            ),
            "{name} -> {err:?}"
        );
    }
}

#[test]
fn test_sort_queue_orders_by_sequence_and_classifies_kind() {
    let queue = sort_queue(vec![
        "SH_0000000003".to_string(),
        "EX_0000000001".to_string(),
        "SP_0000000002".to_string(),
    ])
    .unwrap();

    let names: Vec<_> = queue.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["EX_0000000001", "SP_0000000002", "SH_0000000003"]);
    assert_eq!(queue[0].kind, Some(ReservationKind::Exclusive));
    assert!(queue[0].is_exclusive());
    assert_eq!(queue[1].kind, Some(ReservationKind::Semaphore));
    assert!(!queue[2].is_exclusive());
}

#[test]
fn test_sort_queue_fails_on_any_malformed_sibling() {
    let result = sort_queue(vec!["EX_0000000001".to_string(), "garbage".to_string()]);
    assert!(matches!(
        result,
        Err(Error::Coordination(CoordinationError::MalformedReservationName(_)))
    ));
}

#[test]
fn test_unknown_prefix_parses_without_kind() {
    let entry = QueueEntry::parse("XX_0000000005").unwrap();
    assert_eq!(entry.sequence, 5);
    assert_eq!(entry.kind, None);
    assert!(!entry.is_exclusive());
}

#[test]
fn test_kind_round_trips_through_prefix() {
    for kind in ReservationKind::ALL {
        let name = format!("{}_0000000001", kind.prefix());
        assert_eq!(ReservationKind::from_node_name(&name), Some(kind));
    }
    assert_eq!(ReservationKind::from_node_name("EX0000000001"), None);
    assert_eq!(ReservationKind::Shared.category(), ReservationKind::Exclusive.category());
}
