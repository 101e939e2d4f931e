use hostconverge::core::{Plan, Runner};
use hostconverge::error::PlanError;

use crate::host_harness::FakeHost;

#[tokio::test]
async fn cycle_executes_zero_steps() {
    let host = FakeHost::new();
    let steps = vec![
        host.step("nginx").requires(["gunicorn"]),
        host.step("gunicorn").requires(["env"]),
        host.step("env").requires(["nginx"]),
    ];

    let err = Runner::default().converge(steps).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "cycle detected: nginx -> env -> gunicorn -> nginx"
    );
    assert!(host.applied().is_empty());
}

#[test]
fn two_step_cycle_is_rejected() {
    let host = FakeHost::new();
    let err = Plan::new(vec![
        host.step("a").requires(["b"]),
        host.step("b").requires(["a"]),
    ])
    .unwrap_err();

    assert!(matches!(err, PlanError::Cycle(ref path) if path.len() == 3));
}

#[test]
fn unknown_dependency_names_offender() {
    let host = FakeHost::new();
    let err = Plan::new(vec![
        host.step("pkg"),
        host.step("svc").requires(["pkgg"]),
    ])
    .unwrap_err();

    assert_eq!(
        err,
        PlanError::UnknownDependency {
            step: "svc".into(),
            dependency: "pkgg".into(),
            known: "pkg, svc".into(),
        }
    );
}

#[test]
fn duplicate_ids_rejected() {
    let host = FakeHost::new();
    let err = Plan::new(vec![host.step("pkg"), host.step("pkg")]).unwrap_err();
    assert_eq!(err, PlanError::DuplicateId("pkg".into()));
}

#[tokio::test]
async fn forward_reference_executes_zero_steps() {
    let host = FakeHost::new();
    let steps = vec![
        host.step("svc").requires(["pkg"]),
        host.step("pkg"),
        host.step("motd"),
    ];

    let err = Runner::default().converge(steps).await.unwrap_err();

    assert_eq!(
        err,
        PlanError::ForwardDependency {
            step: "svc".into(),
            dependency: "pkg".into(),
        }
    );
    assert!(host.applied().is_empty());
}

#[test]
fn execution_order_follows_declaration() {
    let host = FakeHost::new();
    let plan = Plan::new(vec![
        host.step("pkg"),
        host.step("motd"),
        host.step("svc").requires(["pkg"]),
    ])
    .unwrap();

    let order = plan.execution_order().map(|s| s.id()).collect::<Vec<_>>();
    assert_eq!(order, ["pkg", "motd", "svc"]);
}
