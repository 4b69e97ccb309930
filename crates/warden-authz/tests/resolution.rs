//! End-to-end decision behavior over populated caches

mod common;

use common::{binding, caches, role, rule, user, Bound};
use warden_authz::permission::matches;
use warden_authz::{AuthzConfig, Constraints, DecisionEngine, Dimension, GroupResource, MatchMode};

fn pods() -> GroupResource {
    GroupResource::new("apps", "pods")
}

fn request(pairs: &[(Dimension, &str)]) -> Constraints {
    pairs.iter().map(|(d, v)| (*d, v.to_string())).collect()
}

fn engine(mode: MatchMode) -> DecisionEngine {
    let caches = caches(
        &[user("u1", &["devs"]), user("loner", &[])],
        &[
            binding("u1-p1", "reader", "project", Bound::Subject("u1"), Some("p1"), &[]),
            binding("devs-ops", "operator", "cluster", Bound::Group("devs"), None, &["c1", "c2"]),
        ],
        &[
            role("pod-reader", "reader", vec![rule(&["apps"], &["pods"], &["get", "list"])]),
            role("pod-operator", "operator", vec![rule(&["*"], &["pods"], &["update", "delete"])]),
            role("super", "root", vec![rule(&["*"], &["*"], &["*"])]),
        ],
    );
    DecisionEngine::new(caches, &AuthzConfig::default().with_match_mode(mode))
}

#[tokio::test]
async fn subject_without_bindings_gets_nothing() {
    for mode in [MatchMode::Strict, MatchMode::Legacy] {
        let engine = engine(mode);
        for subject in ["loner", "never-seen"] {
            let actions = engine
                .get_actions(subject, &pods(), &request(&[(Dimension::Project, "p1")]))
                .await
                .unwrap();
            assert!(actions.is_empty(), "{subject} in {mode}");
        }
    }
}

#[test]
fn unconstrained_permission_matches_any_request() {
    let requests = [
        Constraints::new(),
        request(&[(Dimension::Project, "p1")]),
        request(&[(Dimension::Cluster, "c9"), (Dimension::Namespace, "ns")]),
        request(&[(Dimension::ResourceName, "web")]),
    ];
    for mode in [MatchMode::Strict, MatchMode::Legacy] {
        for req in &requests {
            assert!(matches(&Constraints::new(), req, mode));
        }
    }
}

#[tokio::test]
async fn wildcard_grant_collapses_actions() {
    let caches = caches(
        &[user("u1", &["admins"])],
        &[
            binding("direct", "reader", "platform", Bound::Subject("u1"), None, &[]),
            binding("via-group", "root", "platform", Bound::Group("admins"), None, &[]),
        ],
        &[
            role("pod-reader", "reader", vec![rule(&["apps"], &["pods"], &["get", "list"])]),
            role("super", "root", vec![rule(&["*"], &["*"], &["*"])]),
        ],
    );
    let engine = DecisionEngine::new(caches, &AuthzConfig::default());
    let actions = engine
        .get_actions("u1", &pods(), &Constraints::new())
        .await
        .unwrap();
    assert!(actions.is_wildcard());
    assert_eq!(actions.into_vec(), vec!["*"]);
    assert!(engine
        .verify("u1", "escalate", &pods(), &Constraints::new())
        .await
        .unwrap());
}

#[tokio::test]
async fn cluster_binding_matches_by_membership() {
    for mode in [MatchMode::Strict, MatchMode::Legacy] {
        let engine = engine(mode);
        let perms = engine.expander().expand("u1", &pods()).await;
        let joined: Vec<_> = perms
            .iter()
            .filter_map(|p| p.constraints.get(&Dimension::Cluster))
            .collect();
        assert_eq!(joined, vec!["c1,c2"]);

        let c2 = request(&[(Dimension::Cluster, "c2")]);
        let c3 = request(&[(Dimension::Cluster, "c3")]);
        assert!(engine.verify("u1", "delete", &pods(), &c2).await.unwrap(), "{mode}");
        assert!(!engine.verify("u1", "delete", &pods(), &c3).await.unwrap(), "{mode}");
    }
}

#[tokio::test]
async fn project_binding_decides_verify() {
    let engine = engine(MatchMode::Strict);
    let p1 = request(&[(Dimension::Project, "p1")]);
    let p2 = request(&[(Dimension::Project, "p2")]);

    assert!(engine.verify("u1", "get", &pods(), &p1).await.unwrap());
    assert!(engine.verify("u1", "list", &pods(), &p1).await.unwrap());
    assert!(!engine.verify("u1", "get", &pods(), &p2).await.unwrap());
    // the reader rule is limited to the apps group
    assert!(!engine
        .verify("u1", "get", &GroupResource::new("", "pods"), &p1)
        .await
        .unwrap());
}

#[tokio::test]
async fn request_spanning_both_bindings_unions_their_actions() {
    let req = request(&[(Dimension::Project, "p1"), (Dimension::Cluster, "c1")]);
    let strict = engine(MatchMode::Strict)
        .get_actions("u1", &pods(), &req)
        .await
        .unwrap();
    let legacy = engine(MatchMode::Legacy)
        .get_actions("u1", &pods(), &req)
        .await
        .unwrap();
    assert_eq!(strict.into_vec(), vec!["delete", "get", "list", "update"]);
    assert_eq!(legacy.into_vec(), vec!["delete", "get", "list", "update"]);

    let cluster_only = request(&[(Dimension::Cluster, "c1")]);
    let strict = engine(MatchMode::Strict)
        .get_actions("u1", &pods(), &cluster_only)
        .await
        .unwrap();
    assert_eq!(strict.into_vec(), vec!["delete", "update"]);
}

#[tokio::test]
async fn blank_scope_binding_grants_through_labels() {
    let caches = caches(
        &[],
        &[binding("b", "reader", "", Bound::Subject("u1"), Some("p1"), &[])],
        &[role("pod-reader", "reader", vec![rule(&["apps"], &["pods"], &["get"])])],
    );
    for mode in [MatchMode::Strict, MatchMode::Legacy] {
        let config = AuthzConfig::default().with_match_mode(mode);
        let engine = DecisionEngine::new(caches.clone(), &config);
        let p1 = request(&[(Dimension::Project, "p1")]);
        let p2 = request(&[(Dimension::Project, "p2")]);
        assert!(engine.verify("u1", "get", &pods(), &p1).await.unwrap(), "{mode}");
        assert!(!engine.verify("u1", "get", &pods(), &p2).await.unwrap(), "{mode}");
    }
}
