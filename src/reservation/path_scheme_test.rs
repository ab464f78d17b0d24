use super::path_scheme::*;
use crate::CoordinationError;
use crate::Error;
use crate::PathConfig;
use crate::ReservationKind;

#[test]
fn test_entity_path_uses_kind_category() {
    let scheme = PathScheme::new("/app");

    assert_eq!(
        scheme.entity_path(ReservationKind::Exclusive, "jobs/export").unwrap(),
        "/app/coord/lock/jobs/export"
    );
    assert_eq!(
        scheme.entity_path(ReservationKind::Shared, "jobs/export").unwrap(),
        "/app/coord/lock/jobs/export"
    );
    assert_eq!(
        scheme.entity_path(ReservationKind::Semaphore, "pool/x").unwrap(),
        "/app/coord/semaphore/pool/x"
    );
}

#[test]
fn test_root_base_path_does_not_double_slash() {
    let scheme = PathScheme::new("/");
    assert_eq!(scheme.coord_root(), "/coord");
    assert_eq!(
        scheme.entity_path(ReservationKind::Exclusive, "a").unwrap(),
        "/coord/lock/a"
    );
}

#[test]
fn test_from_config_uses_default_base() {
    let scheme = PathScheme::from_config(&PathConfig::default());
    assert_eq!(scheme.coord_root(), "/d-coord/coord");
}

#[test]
fn test_invalid_entity_names_are_rejected() {
    let scheme = PathScheme::new("/app");
    for name in ["", "/", "a//b", "a/"] {
        assert!(matches!(
            scheme.entity_path(ReservationKind::Exclusive, name),
            Err(Error::Coordination(CoordinationError::InvalidPath(_)))
        ));
    }
}

#[test]
fn test_reservation_prefix() {
    assert_eq!(
        PathScheme::reservation_prefix("/app/coord/lock/a", ReservationKind::Shared),
        "/app/coord/lock/a/SH_"
    );
}

#[test]
fn test_path_helpers() {
    assert_eq!(join_paths("/a", "b"), "/a/b");
    assert_eq!(join_paths("/", "b"), "/b");
    assert_eq!(leaf_name("/a/b/EX_0000000001"), "EX_0000000001");
    assert_eq!(parent_path("/a/b"), "/a");
    assert_eq!(parent_path("/a"), "/");
    assert!(is_valid_path("/a/b"));
    assert!(!is_valid_path("a/b"));
    assert!(!is_valid_path("/a//b"));
    assert_eq!(ancestors("/a/b/c"), vec!["/a", "/a/b"]);
    assert!(ancestors("/a").is_empty());
}
