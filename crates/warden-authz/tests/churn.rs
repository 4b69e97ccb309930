//! Expansion while the caches are being rewritten

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{binding, caches, role, rule, user, Bound};
use warden_authz::{FactStore, GroupResource, PermissionExpander};

const ROUNDS: usize = 200;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expand_during_cache_churn_sees_whole_records() {
    let caches = caches(
        &[user("u1", &["devs"])],
        &[binding("devs-ops", "ops", "cluster", Bound::Group("devs"), None, &["c1", "c2"])],
        &[role("ops", "ops", vec![rule(&["*"], &["pods"], &["get", "update"])])],
    );
    let expander = Arc::new(PermissionExpander::new(caches.clone(), Duration::from_secs(5)));

    let writer = {
        let caches = caches.clone();
        tokio::spawn(async move {
            for i in 0..ROUNDS {
                let clusters: &[&str] = if i % 2 == 0 { &["c3"] } else { &["c1", "c2"] };
                let verbs: &[&str] = if i % 2 == 0 { &["list"] } else { &["get", "update"] };
                let devs = Bound::Group("devs");
                caches
                    .bindings
                    .on_apply(&binding("devs-ops", "ops", "cluster", devs, None, clusters))
                    .unwrap();
                caches
                    .roles
                    .on_apply(&role("ops", "ops", vec![rule(&["*"], &["pods"], verbs)]))
                    .unwrap();
                if i % 10 == 0 {
                    caches.subjects.on_delete(&user("u1", &["devs"]));
                    caches.subjects.on_apply(&user("u1", &["devs"])).unwrap();
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let expander = expander.clone();
            tokio::spawn(async move {
                let pods = GroupResource::new("", "pods");
                for _ in 0..ROUNDS {
                    for perm in expander.expand("u1", &pods).await {
                        let cluster = perm
                            .constraints
                            .get(&warden_authz::Dimension::Cluster)
                            .map(String::as_str);
                        assert!(
                            matches!(cluster, Some("c3") | Some("c1,c2")),
                            "torn binding: {cluster:?}"
                        );
                        assert!(
                            perm.actions == ["list"] || perm.actions == ["get", "update"],
                            "torn role: {:?}",
                            perm.actions
                        );
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(caches.bindings.len(), 1);
    assert_eq!(caches.roles.len(), 1);
}
