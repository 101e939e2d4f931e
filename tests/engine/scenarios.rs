use std::time::Duration;

use hostconverge::core::{Outcome, RunStatus, Runner, RunnerOptions};
use hostconverge::error::StepError;

use crate::host_harness::FakeHost;

#[tokio::test]
async fn missing_package_converges() {
    let host = FakeHost::new();
    let report = Runner::default()
        .converge(vec![host.step("pkg")])
        .await
        .unwrap();

    assert_eq!(report.outcomes(), vec![("pkg", &Outcome::Converged)]);
    assert_eq!(report.status(), RunStatus::FullySatisfied);
    assert!(host.has("pkg"));
}

#[tokio::test]
async fn fatal_failure_halts_run() {
    let host = FakeHost::new();
    let steps = vec![
        host.broken_step("a", "apt lock held").fatal(true),
        host.step("b").requires(["a"]),
    ];

    let report = Runner::default().converge(steps).await.unwrap();

    assert_eq!(report.steps().len(), 2);
    assert_eq!(report.steps()[0].id, "a");
    assert!(report.steps()[0].outcome.is_failed());
    assert_eq!(
        report.outcome("b"),
        Some(&Outcome::SkippedDueToDependency)
    );
    assert_eq!(report.status(), RunStatus::HaltedOnFatal);
    assert_eq!(host.applied(), vec!["a"]);
}

#[tokio::test]
async fn non_fatal_failure_does_not_stop_independent_steps() {
    let host = FakeHost::with_facts(&["b"]);
    let steps = vec![host.broken_step("a", "boom"), host.step("b")];

    let report = Runner::default().converge(steps).await.unwrap();

    assert_eq!(
        report.outcomes(),
        vec![
            ("a", &Outcome::Failed(StepError::Execution("boom".into()))),
            ("b", &Outcome::AlreadySatisfied),
        ]
    );
    assert_eq!(report.status(), RunStatus::PartialFailure);
    assert_eq!(report.status().exit_code(), 2);
}

#[tokio::test]
async fn dependent_of_failed_step_skips_even_when_satisfied() {
    let host = FakeHost::with_facts(&["b"]);
    let steps = vec![host.broken_step("a", "boom"), host.step("b").requires(["a"])];

    let report = Runner::default().converge(steps).await.unwrap();

    assert_eq!(
        report.outcome("b"),
        Some(&Outcome::SkippedDueToDependency)
    );
    assert_eq!(report.status(), RunStatus::PartialFailure);
}

#[tokio::test]
async fn fatal_halt_keeps_completed_outcomes() {
    let host = FakeHost::with_facts(&["base"]);
    let steps = vec![
        host.step("base"),
        host.step("db"),
        host.broken_step("migrate", "no such table").fatal(true),
        host.step("web"),
        host.step("proxy").requires(["web"]),
    ];

    let report = Runner::default().converge(steps).await.unwrap();

    assert_eq!(
        report.outcomes(),
        vec![
            ("base", &Outcome::AlreadySatisfied),
            ("db", &Outcome::Converged),
            (
                "migrate",
                &Outcome::Failed(StepError::Execution("no such table".into()))
            ),
            ("web", &Outcome::SkippedDueToDependency),
            ("proxy", &Outcome::SkippedDueToDependency),
        ]
    );
    assert_eq!(report.status(), RunStatus::HaltedOnFatal);
    assert!(!host.has("web"));
}

#[tokio::test]
async fn every_step_gets_exactly_one_outcome() {
    let host = FakeHost::with_facts(&["s3"]);
    let steps = vec![
        host.step("s1"),
        host.broken_step("s2", "boom").requires(["s1"]),
        host.step("s3"),
        host.step("s4").requires(["s2", "s3"]),
        host.step("s5").requires(["s4"]),
        host.step("s6").requires(["s1"]),
    ];

    for parallel in [1, 3] {
        let runner = Runner::new(RunnerOptions {
            max_parallel: parallel,
            ..RunnerOptions::default()
        });
        let report = runner.converge(steps.clone()).await.unwrap();

        let mut ids = report
            .steps()
            .iter()
            .map(|step| step.id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        assert_eq!(ids, ["s1", "s2", "s3", "s4", "s5", "s6"]);
        assert_eq!(report.outcome("s4"), Some(&Outcome::SkippedDueToDependency));
        assert_eq!(report.outcome("s5"), Some(&Outcome::SkippedDueToDependency));
    }
}

#[tokio::test]
async fn retries_recover_transient_failures() {
    let host = FakeHost::new();
    let step = host
        .flaky_step("apt", 2)
        .with_retries(3, Duration::from_millis(1));

    let report = Runner::default().converge(vec![step]).await.unwrap();

    assert_eq!(report.outcome("apt"), Some(&Outcome::Converged));
    assert_eq!(host.applied(), vec!["apt", "apt", "apt"]);
}

#[tokio::test]
async fn exhausted_retries_fail_the_step() {
    let host = FakeHost::new();
    let step = host
        .flaky_step("apt", 5)
        .with_retries(2, Duration::from_millis(1));

    let report = Runner::default().converge(vec![step]).await.unwrap();

    match report.outcome("apt") {
        Some(Outcome::Failed(StepError::Execution(detail))) => {
            assert!(detail.contains("gave up after 2 attempt(s)"), "{detail}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
