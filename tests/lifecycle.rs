//! Lifecycle scenarios for the reconciliation controller
//!
//! These drive the controller against the in-memory fake remote and check the
//! calls it issues, the tracked state it keeps and the warnings it surfaces.

mod common;

use common::{acme, attrs, controller, unavailable, Call, FakeRemote};
use greseller::reconcile::{
    Binding, ErrorKind, ReconcileError, RemoteError, ResourceIdentity, RetryPolicy, Warning,
};
use serde_json::json;

mod create {
    use super::*;

    #[tokio::test]
    async fn test_create_binds_identity_and_state() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());

        let outcome = ctl.create(&acme()).await.unwrap();

        assert_eq!(ctl.binding(), Binding::Bound);
        assert_eq!(ctl.identity().unwrap().as_str(), "B-100");
        assert_eq!(ctl.observed().unwrap(), &acme());
        assert_eq!(outcome.mutations, 1);
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            remote.calls(),
            vec![Call::Create(acme()), Call::Get("B-100".into())]
        );
    }

    #[tokio::test]
    async fn test_create_retries_transient_failure() {
        let remote = FakeRemote::new();
        remote.fail_next(unavailable());
        let (mut ctl, sleeper) = controller(&remote, RetryPolicy::default());

        ctl.create(&acme()).await.unwrap();

        assert_eq!(remote.mutation_count(), 2);
        assert_eq!(remote.get_count(), 1);
        assert_eq!(sleeper.delays().len(), 1);
        assert_eq!(ctl.identity().unwrap().as_str(), "B-100");
    }

    #[tokio::test]
    async fn test_create_rejected_stays_unbound() {
        let remote = FakeRemote::new();
        remote.fail_next(RemoteError::api(
            400,
            Some("INVALID_ARGUMENT"),
            "invalid master billing account",
        ));
        let (mut ctl, sleeper) = controller(&remote, RetryPolicy::default());

        let err = ctl.create(&acme()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(ctl.binding(), Binding::Unbound);
        assert_eq!(remote.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_create_sends_unsupported_field() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        let desired = attrs(json!({"displayName": "Acme", "masterAccount": "A-1", "open": false}));

        ctl.create(&desired).await.unwrap();

        assert_eq!(remote.calls()[0], Call::Create(desired));
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn test_update_patches_only_changed_field() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.clear_calls();

        let outcome = ctl
            .update(&attrs(json!({"displayName": "Acme Corp"})))
            .await
            .unwrap();

        assert_eq!(outcome.mutations, 1);
        assert_eq!(
            remote.calls(),
            vec![
                Call::Patch {
                    id: "B-100".into(),
                    fields: attrs(json!({"displayName": "Acme Corp"})),
                    mask: vec!["displayName".into()],
                },
                Call::Get("B-100".into()),
            ]
        );
        assert_eq!(ctl.observed().unwrap()["displayName"], json!("Acme Corp"));
        assert_eq!(ctl.observed().unwrap()["masterAccount"], json!("A-1"));
    }

    #[tokio::test]
    async fn test_second_update_issues_no_patch() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        let desired = attrs(json!({"displayName": "Acme Corp", "masterAccount": "A-1"}));

        ctl.update(&desired).await.unwrap();
        remote.clear_calls();
        let outcome = ctl.update(&desired).await.unwrap();

        assert_eq!(outcome.mutations, 0);
        assert_eq!(remote.patch_count(), 0);
        assert_eq!(remote.calls(), vec![Call::Get("B-100".into())]);
    }

    #[tokio::test]
    async fn test_immutable_change_is_conflict_without_calls() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.clear_calls();

        let err = ctl
            .update(&attrs(json!({"masterAccount": "A-2"})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
        assert!(matches!(
            err,
            ReconcileError::ConfigurationConflict { ref field, .. } if field == "masterAccount"
        ));
        assert_eq!(remote.call_count(), 0);
        assert_eq!(ctl.binding(), Binding::Bound);
    }

    #[tokio::test]
    async fn test_immutable_change_blocks_other_changes() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.clear_calls();

        let err = ctl
            .update(&attrs(json!({"displayName": "New", "masterAccount": "A-2"})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_change_warns_and_succeeds() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&attrs(json!({"displayName": "Acme", "masterAccount": "A-1", "open": true})))
            .await
            .unwrap();
        remote.clear_calls();

        let outcome = ctl.update(&attrs(json!({"open": false}))).await.unwrap();

        assert_eq!(remote.mutation_count(), 0);
        assert_eq!(outcome.mutations, 0);
        assert_eq!(
            outcome.warnings,
            vec![Warning::UnsupportedChange {
                field: "open".into(),
                current: json!(true),
                desired: json!(false),
            }]
        );
        assert_eq!(ctl.observed().unwrap()["open"], json!(true));
    }

    #[tokio::test]
    async fn test_unsupported_change_does_not_block_mutable_change() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&attrs(json!({"displayName": "Acme", "masterAccount": "A-1", "open": true})))
            .await
            .unwrap();
        remote.clear_calls();

        let outcome = ctl
            .update(&attrs(json!({"displayName": "Acme Corp", "open": false})))
            .await
            .unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            remote.calls()[0],
            Call::Patch {
                id: "B-100".into(),
                fields: attrs(json!({"displayName": "Acme Corp"})),
                mask: vec!["displayName".into()],
            }
        );
    }

    #[tokio::test]
    async fn test_update_refresh_finds_resource_gone() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.remove("B-100");

        let outcome = ctl.update(&acme()).await.unwrap();

        assert!(outcome.removed);
        assert_eq!(ctl.binding(), Binding::Unbound);
    }
}

mod read {
    use super::*;

    #[tokio::test]
    async fn test_read_refreshes_observed_state() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.set_field("B-100", "displayName", json!("Renamed elsewhere"));

        let outcome = ctl.read().await.unwrap();

        assert!(!outcome.removed);
        assert_eq!(ctl.observed().unwrap()["displayName"], json!("Renamed elsewhere"));
    }

    #[tokio::test]
    async fn test_read_not_found_drops_tracking() {
        let remote = FakeRemote::new();
        let (mut ctl, sleeper) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.remove("B-100");

        let outcome = ctl.read().await.unwrap();

        assert!(outcome.removed);
        assert_eq!(ctl.binding(), Binding::Unbound);
        assert!(ctl.tracked().is_none());
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_read_permanent_error_keeps_tracking() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.fail_next(RemoteError::api(403, Some("PERMISSION_DENIED"), "denied"));

        let err = ctl.read().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(ctl.binding(), Binding::Bound);
    }

    #[tokio::test]
    async fn test_read_reports_immutable_drift() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.set_field("B-100", "masterAccount", json!("A-9"));

        let outcome = ctl.read().await.unwrap();

        assert_eq!(
            outcome.warnings,
            vec![Warning::ImmutableDrift {
                field: "masterAccount".into(),
                pinned: json!("A-1"),
                observed: json!("A-9"),
            }]
        );
        // the creation-time value still governs updates
        assert!(ctl.plan(&acme()).unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_read_exhausted_retries_surface_transient() {
        let remote = FakeRemote::new();
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let (mut ctl, sleeper) = controller(&remote, policy);
        ctl.create(&acme()).await.unwrap();
        remote.clear_calls();
        remote.fail_always(unavailable());

        let err = ctl.read().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(matches!(err, ReconcileError::Remote { attempts: 3, .. }));
        assert_eq!(remote.call_count(), 3);
        assert_eq!(sleeper.delays().len(), 2);
        assert_eq!(ctl.binding(), Binding::Bound);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_delete_makes_no_remote_call() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.clear_calls();

        let outcome = ctl.delete().unwrap();

        assert_eq!(remote.call_count(), 0);
        assert_eq!(ctl.binding(), Binding::Unbound);
        assert_eq!(
            outcome.warnings,
            vec![Warning::RemoteResourceRetained {
                identity: "B-100".into()
            }]
        );

        // the account is still there remotely and can be imported again
        ctl.import(ResourceIdentity::new("B-100")).await.unwrap();
        assert_eq!(ctl.binding(), Binding::Bound);
    }
}

mod import {
    use super::*;

    #[tokio::test]
    async fn test_import_binds_existing_resource() {
        let remote = FakeRemote::new();
        remote.insert("B-555", json!({"displayName": "Existing", "masterAccount": "A-3"}));
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());

        ctl.import(ResourceIdentity::new("B-555")).await.unwrap();

        assert_eq!(ctl.identity().unwrap().as_str(), "B-555");
        assert_eq!(ctl.observed().unwrap()["displayName"], json!("Existing"));
        assert_eq!(ctl.tracked().unwrap().pinned, attrs(json!({"masterAccount": "A-3"})));

        let err = ctl
            .update(&attrs(json!({"masterAccount": "A-1"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
    }

    #[tokio::test]
    async fn test_import_missing_target_fails() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());

        let err = ctl.import(ResourceIdentity::new("B-404")).await.unwrap_err();

        assert_eq!(err, ReconcileError::ImportTargetMissing("B-404".into()));
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(ctl.binding(), Binding::Unbound);
    }
}

mod reconcile {
    use super::*;

    #[tokio::test]
    async fn test_reconcile_creates_then_converges() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());

        let first = ctl.reconcile(&acme()).await.unwrap();
        assert_eq!(first.mutations, 1);

        let second = ctl.reconcile(&acme()).await.unwrap();
        assert_eq!(second.mutations, 0);
        assert_eq!(remote.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_create_observed_state_comes_from_read() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());

        remote.server_default("open", json!(true));

        let outcome = ctl.create(&acme()).await.unwrap();

        assert_eq!(outcome.mutations, 1);
        assert_eq!(ctl.observed().unwrap()["open"], json!(true));
        assert_eq!(remote.get_count(), 1);
    }

    #[tokio::test]
    async fn test_bound_reconcile_reads_once_and_warns_once() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.set_field("B-100", "masterAccount", json!("A-9"));
        remote.clear_calls();

        let outcome = ctl.reconcile(&acme()).await.unwrap();

        assert_eq!(remote.calls(), vec![Call::Get("B-100".into())]);
        assert_eq!(outcome.mutations, 0);
        assert_eq!(
            outcome.warnings,
            vec![Warning::ImmutableDrift {
                field: "masterAccount".into(),
                pinned: json!("A-1"),
                observed: json!("A-9"),
            }]
        );
    }

    #[tokio::test]
    async fn test_bound_reconcile_with_patch_reports_drift_once() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.create(&acme()).await.unwrap();
        remote.set_field("B-100", "masterAccount", json!("A-9"));
        remote.clear_calls();

        let outcome = ctl
            .reconcile(&attrs(json!({"displayName": "Acme Corp", "masterAccount": "A-1"})))
            .await
            .unwrap();

        assert_eq!(outcome.mutations, 1);
        assert_eq!(remote.get_count(), 2);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_recreates_after_remote_removal() {
        let remote = FakeRemote::new();
        let (mut ctl, _) = controller(&remote, RetryPolicy::default());
        ctl.reconcile(&acme()).await.unwrap();
        remote.remove("B-100");

        let outcome = ctl.reconcile(&acme()).await.unwrap();

        assert!(!outcome.removed);
        assert_eq!(outcome.mutations, 1);
        assert_eq!(ctl.identity().unwrap().as_str(), "B-101");
    }
}

/// The end-to-end walkthrough: create, rename, attempt to move, lose, forget.
#[tokio::test]
async fn test_full_scenario() {
    let remote = FakeRemote::new();
    let (mut ctl, _) = controller(&remote, RetryPolicy::default());

    ctl.create(&acme()).await.unwrap();
    assert_eq!(ctl.identity().unwrap().as_str(), "B-100");
    assert_eq!(ctl.observed().unwrap(), &acme());

    remote.clear_calls();
    ctl.update(&attrs(json!({"displayName": "Acme Corp"}))).await.unwrap();
    assert_eq!(remote.patch_count(), 1);
    assert_eq!(ctl.observed().unwrap()["displayName"], json!("Acme Corp"));

    remote.clear_calls();
    let err = ctl
        .update(&attrs(json!({"masterAccount": "A-2"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
    assert_eq!(remote.call_count(), 0);

    let snapshot = ctl.tracked().cloned();
    remote.remove("B-100");
    assert!(ctl.read().await.unwrap().removed);
    assert_eq!(ctl.binding(), Binding::Unbound);

    ctl.restore(snapshot);
    remote.clear_calls();
    let outcome = ctl.delete().unwrap();
    assert_eq!(remote.call_count(), 0);
    assert_eq!(ctl.binding(), Binding::Unbound);
    assert_eq!(outcome.warnings.len(), 1);
}
