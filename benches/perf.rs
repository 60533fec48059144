use criterion::{Criterion, black_box, criterion_group, criterion_main};
use scopegate::permission::{PermissionGrant, PermissionKind, RequestedTarget};
use scopegate::role::{Principal, Role};
use scopegate::{Authorizer, ScopegateConfig, StaticPrincipalSource, aggregate, resolve};
use tokio::runtime::Runtime;

const SCHEMAS: usize = 50;
const TABLES_PER_SCHEMA: usize = 20;

fn wide_principal() -> Principal {
    let mut roles = Vec::new();
    for (role_id, kind) in PermissionKind::ALL.into_iter().enumerate() {
        let mut grants = Vec::new();
        for s in 0..SCHEMAS {
            for t in 0..TABLES_PER_SCHEMA {
                grants.push(PermissionGrant::table(
                    kind,
                    format!("schema_{s}"),
                    format!("table_{t}"),
                ));
            }
        }
        roles.push(Role::new(role_id as i64, format!("role_{role_id}")).with_grants(grants));
    }
    Principal::new(1, roles)
}

fn bench_aggregate(c: &mut Criterion) {
    let principal = wide_principal();
    let grants: Vec<PermissionGrant> = principal.grants().cloned().collect();
    let hit = RequestedTarget::table("schema_49", "table_19");
    let miss = RequestedTarget::table("schema_x", "table_0");

    c.bench_function("aggregate_4k_grants_hit_last", |b| {
        b.iter(|| aggregate(black_box(&grants), black_box(&hit)))
    });
    c.bench_function("aggregate_4k_grants_miss", |b| {
        b.iter(|| aggregate(black_box(&grants), black_box(&miss)))
    });
    c.bench_function("resolve_schema_level", |b| {
        let target = RequestedTarget::schema("schema_25");
        b.iter(|| resolve(black_box(&principal), black_box(&target)))
    });
}

fn bench_cached_authorizer(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let source = StaticPrincipalSource::new([wide_principal()]);
    let authz = Authorizer::new(ScopegateConfig::production(), source).expect("authorizer");
    let target = RequestedTarget::table("schema_10", "table_5");
    rt.block_on(authz.detailed_permissions(1, &target))
        .expect("warm cache");

    c.bench_function("authorizer_cached_lookup", |b| {
        b.iter(|| {
            rt.block_on(authz.detailed_permissions(black_box(1), black_box(&target)))
                .expect("resolve")
        })
    });
}

criterion_group!(benches, bench_aggregate, bench_cached_authorizer);
criterion_main!(benches);
