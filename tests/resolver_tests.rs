mod common;

use common::{version, FakeControlPlane};
use edgepack::deploy::{select_version, DeployError, VersionResolver};
use proptest::prelude::*;

#[tokio::test]
async fn test_active_version_wins_and_is_cloned() {
    let api = FakeControlPlane::new().with_versions(
        "svc",
        vec![version(1, true, false, 1), version(2, false, true, 2)],
    );

    let resolved = VersionResolver::new(&api, "svc").resolve(None).await.unwrap();

    assert_eq!(resolved.number, 3);
    assert!(!resolved.active);
    assert_eq!(api.calls().iter().filter(|c| *c == "clone_version:svc/1").count(), 1);
}

#[tokio::test]
async fn test_base_never_clones() {
    let api = FakeControlPlane::new().with_versions(
        "svc",
        vec![version(1, true, false, 1), version(2, false, true, 2)],
    );

    let base = VersionResolver::new(&api, "svc").base(None).await.unwrap();

    assert_eq!(base.number, 1);
    assert!(base.active);
    assert_eq!(api.count("clone_version"), 0);
}

#[tokio::test]
async fn test_editable_latest_is_used_as_is() {
    let api = FakeControlPlane::new().with_versions(
        "svc",
        vec![version(1, false, false, 1), version(2, false, false, 2)],
    );

    let resolved = VersionResolver::new(&api, "svc").resolve(None).await.unwrap();

    assert_eq!(resolved.number, 2);
    assert_eq!(api.count("clone_version"), 0);
}

#[tokio::test]
async fn test_explicit_editable_version_is_not_cloned() {
    let api = FakeControlPlane::new().with_versions(
        "svc",
        vec![version(1, true, false, 1), version(2, false, false, 2)],
    );

    let resolved = VersionResolver::new(&api, "svc").resolve(Some(2)).await.unwrap();

    assert_eq!(resolved.number, 2);
    assert_eq!(api.count("clone_version"), 0);
}

#[tokio::test]
async fn test_explicit_locked_version_is_cloned() {
    let api = FakeControlPlane::new().with_versions(
        "svc",
        vec![version(1, false, true, 1), version(2, true, false, 2)],
    );

    let resolved = VersionResolver::new(&api, "svc").resolve(Some(1)).await.unwrap();

    assert_eq!(resolved.number, 3);
    assert!(api.calls().contains(&"clone_version:svc/1".to_string()));
}

#[tokio::test]
async fn test_unknown_explicit_version_is_a_validation_error() {
    let api = FakeControlPlane::new().with_versions("svc", vec![version(1, false, false, 1)]);

    let err = VersionResolver::new(&api, "svc")
        .resolve(Some(9))
        .await
        .unwrap_err();

    match err {
        DeployError::Validation { field, reason } => {
            assert_eq!(field, "version");
            assert!(reason.contains('9'));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_version_list_fails() {
    let api = FakeControlPlane::new().with_versions("svc", vec![]);
    assert!(VersionResolver::new(&api, "svc").resolve(None).await.is_err());
}

#[tokio::test]
async fn test_list_failure_keeps_collaborator_message() {
    let api = FakeControlPlane::new()
        .with_versions("svc", vec![version(1, false, false, 1)])
        .fail_on("list_versions");

    let err = VersionResolver::new(&api, "svc").resolve(None).await.unwrap_err();

    assert!(matches!(err, DeployError::Collaborator { .. }));
    assert_eq!(
        err.to_string(),
        "error listing service versions: list_versions is unavailable (status 500)"
    );
}

fn arb_versions() -> impl Strategy<Value = Vec<(bool, bool, i64)>> {
    prop::collection::vec((any::<bool>(), any::<bool>(), 0i64..50), 1..12)
}

proptest! {
    #[test]
    fn prop_selection_priority(specs in arb_versions()) {
        let versions: Vec<_> = specs
            .iter()
            .enumerate()
            .map(|(i, (active, locked, minutes))| version(i as u32 + 1, *active, *locked, *minutes))
            .collect();

        let chosen = select_version(&versions).unwrap();

        if versions.iter().any(|v| v.active) {
            prop_assert!(chosen.active);
        } else if versions.iter().any(|v| v.locked) {
            prop_assert!(chosen.locked);
        } else {
            let newest = versions.iter().map(|v| v.updated_at).max().unwrap();
            prop_assert_eq!(chosen.updated_at, newest);
        }
    }

    #[test]
    fn prop_resolved_immutable_is_always_a_new_number(specs in arb_versions()) {
        let versions: Vec<_> = specs
            .iter()
            .enumerate()
            .map(|(i, (active, locked, minutes))| version(i as u32 + 1, *active, *locked, *minutes))
            .collect();
        let base = select_version(&versions).unwrap();
        let api = FakeControlPlane::new().with_versions("svc", versions.clone());

        let resolved =
            tokio_test::block_on(VersionResolver::new(&api, "svc").resolve(None)).unwrap();

        if base.is_immutable() {
            prop_assert_ne!(resolved.number, base.number);
            prop_assert!(!resolved.is_immutable());
        } else {
            prop_assert_eq!(resolved.number, base.number);
        }
    }
}
