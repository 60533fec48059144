use crate::error::AuthzError;
use crate::permission::{GrantRecord, PermissionGrant, PermissionKind, RequestedTarget};
use crate::role::{Principal, Role};
use crate::source::{PrincipalSource, StaticPrincipalSource};
use crate::{Authorizer, RightsChange, ScopegateConfig};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn analyst_role() -> Role {
    Role::new(3, "Analyst").with_grants([
        PermissionGrant::schema(PermissionKind::Read, "sales"),
        PermissionGrant::table(PermissionKind::Write, "sales", "orders"),
    ])
}

fn directory() -> Arc<StaticPrincipalSource> {
    Arc::new(StaticPrincipalSource::new([
        Principal::new(1, vec![analyst_role()]),
        Principal::new(2, vec![analyst_role()]),
        Principal::new(3, vec![Role::system(1, "ADMIN")]),
    ]))
}

/// Counts loads so tests can tell cache hits from fresh resolutions.
struct CountingSource {
    inner: Arc<StaticPrincipalSource>,
    loads: AtomicUsize,
}

impl PrincipalSource for CountingSource {
    fn load_principal(
        &self,
        principal_id: i64,
    ) -> impl Future<Output = Result<Option<Principal>, AuthzError>> + Send {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_principal(principal_id)
    }
}

struct FailingSource;

impl PrincipalSource for FailingSource {
    fn load_principal(
        &self,
        _principal_id: i64,
    ) -> impl Future<Output = Result<Option<Principal>, AuthzError>> + Send {
        std::future::ready(Err(AuthzError::Unavailable {
            message: "directory offline".into(),
        }))
    }
}

fn counting(inner: Arc<StaticPrincipalSource>) -> Authorizer<CountingSource> {
    Authorizer::new(
        ScopegateConfig::default(),
        CountingSource {
            inner,
            loads: AtomicUsize::new(0),
        },
    )
    .expect("authorizer")
}

#[tokio::test]
async fn same_question_is_answered_from_cache() {
    let authz = counting(directory());
    let target = RequestedTarget::table("sales", "orders");

    let first = authz.detailed_permissions(1, &target).await.expect("resolve");
    let second = authz
        .detailed_permissions(1, &RequestedTarget::table("sales", "orders"))
        .await
        .expect("resolve");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(authz.source().loads.load(Ordering::SeqCst), 1);

    let metrics = authz.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.resolutions, 1);
}

#[tokio::test]
async fn unknown_principal_is_unprivileged_not_an_error() {
    let authz = counting(directory());
    let resolved = authz
        .detailed_permissions(404, &RequestedTarget::schema("sales"))
        .await
        .expect("resolve");
    assert!(!resolved.database_permissions.has_db_access);
    assert!(resolved.current_user.role_names.is_empty());
    assert!(!resolved.allows(PermissionKind::Read));
}

#[tokio::test]
async fn source_errors_propagate() {
    let authz = Authorizer::new(ScopegateConfig::default(), FailingSource).expect("authz");
    let err = authz
        .user_permissions(1)
        .await
        .expect_err("source is down");
    assert_eq!(err.code_str(), "unavailable");
}

#[tokio::test]
async fn grant_change_invalidates_every_target_of_every_holder() {
    let source = directory();
    let authz = counting(Arc::clone(&source));
    let customers = RequestedTarget::table("sales", "customers");
    let hr = RequestedTarget::schema("hr");

    for principal_id in [1, 2] {
        assert!(
            !authz
                .check(principal_id, &customers, PermissionKind::Write)
                .await
                .expect("check")
        );
        assert!(
            !authz
                .check(principal_id, &hr, PermissionKind::Read)
                .await
                .expect("check")
        );
    }
    assert!(
        authz
            .check(3, &hr, PermissionKind::Delete)
            .await
            .expect("admin")
    );

    let mut role = analyst_role();
    role.add_grant(GrantRecord::new(PermissionKind::Write))
        .expect("global write");
    source.update_role(&role);
    let mut affected = authz.apply_change(RightsChange::GrantAdded { role_id: role.id });
    affected.sort();
    assert_eq!(affected, vec![1, 2]);

    for principal_id in [1, 2] {
        assert!(
            authz
                .check(principal_id, &customers, PermissionKind::Write)
                .await
                .expect("check")
        );
        assert!(
            authz
                .check(principal_id, &hr, PermissionKind::Write)
                .await
                .expect("check")
        );
    }
}

#[tokio::test]
async fn role_assignment_invalidates_only_that_principal() {
    let source = directory();
    let authz = counting(Arc::clone(&source));
    let target = RequestedTarget::schema("sales");
    authz.detailed_permissions(1, &target).await.expect("resolve");
    authz.detailed_permissions(2, &target).await.expect("resolve");
    assert_eq!(authz.cache().len(), 2);

    source.upsert_principal(Principal::new(
        1,
        vec![analyst_role(), Role::new(2, "VIEWER")],
    ));
    let affected = authz.apply_change(RightsChange::RoleAssigned {
        principal_id: 1,
        role_id: 2,
    });
    assert_eq!(affected, vec![1]);
    assert_eq!(authz.cache().len(), 1);

    let resolved = authz.detailed_permissions(1, &target).await.expect("resolve");
    assert!(resolved.role_permissions.is_database_viewer);
}

#[tokio::test]
async fn rejection_forces_a_fresh_resolution() {
    let source = directory();
    let authz = counting(Arc::clone(&source));
    let target = RequestedTarget::table("sales", "orders");
    assert!(
        authz
            .check(1, &target, PermissionKind::Write)
            .await
            .expect("check")
    );

    // Rights were revoked server-side without a change notification.
    source.upsert_principal(Principal::new(1, vec![Role::new(3, "Analyst")]));
    assert!(
        authz
            .check(1, &target, PermissionKind::Write)
            .await
            .expect("still cached")
    );

    let fresh = authz
        .reresolve_after_rejection(1, &target)
        .await
        .expect("resolve");
    assert!(!fresh.allows(PermissionKind::Write));
    assert_eq!(authz.source().loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_ttl_disables_caching() {
    let inner = directory();
    let authz = Authorizer::new(
        ScopegateConfig::default().with_cache_ttl(std::time::Duration::ZERO),
        CountingSource {
            inner,
            loads: AtomicUsize::new(0),
        },
    )
    .expect("authz");
    let target = RequestedTarget::global();
    authz.detailed_permissions(1, &target).await.expect("resolve");
    authz.detailed_permissions(1, &target).await.expect("resolve");
    assert_eq!(authz.source().loads.load(Ordering::SeqCst), 2);
    assert!(authz.cache().is_empty());
}

#[test]
fn invalid_config_is_refused() {
    let result = Authorizer::new(
        ScopegateConfig::default().with_cache_max_entries(0),
        StaticPrincipalSource::default(),
    );
    assert!(matches!(result, Err(AuthzError::InvalidConfig { .. })));
}
