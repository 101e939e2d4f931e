use std::path::PathBuf;

use hostconverge::app::execute;
use hostconverge::cli::Commands;
use hostconverge::config::Config;
use tempfile::TempDir;

use crate::host_harness::{RecordingShell, exited};

const STACK: &str = r#"
[[step]]
id = "pkg"
kind = "package"
names = ["postgresql", "redis-server"]

[[step]]
id = "svc"
kind = "service"
name = "postgresql"
requires = ["pkg"]
fatal = true

[[step]]
id = "role"
kind = "pg_role"
name = "elearning"
password = "s3cret"
requires = ["svc"]

[[step]]
id = "db"
kind = "pg_database"
name = "elearning"
owner = "elearning"
requires = ["role"]
"#;

fn manifest(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("stack.toml");
    std::fs::write(&path, STACK).unwrap();
    path
}

#[tokio::test]
async fn validate_prints_execution_order() {
    let dir = TempDir::new().unwrap();
    let shell = RecordingShell::new();

    let mut out = Vec::<u8>::new();
    let code = execute(
        Commands::Validate {
            manifest: manifest(&dir),
        },
        &Config::default(),
        shell.clone(),
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(code, 0);
    assert!(text.contains("plan valid: 4 step(s)"), "{text}");
    let positions = ["1. pkg", "2. svc", "3. role", "4. db"]
        .iter()
        .map(|needle| text.find(needle).unwrap_or_else(|| panic!("{needle} in {text}")))
        .collect::<Vec<_>>();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
    assert!(text.contains("(requires: pkg)"));
    assert!(shell.calls().is_empty());
}

#[tokio::test]
async fn check_reports_drift_without_executing() {
    let dir = TempDir::new().unwrap();
    let shell = RecordingShell::new();
    shell.on(
        "dpkg-query",
        vec![exited(
            0,
            "postgresql install ok installed\nredis-server install ok installed\n",
            "",
        )],
    );
    shell.on("systemctl is-active", vec![exited(0, "active\n", "")]);
    shell.on("systemctl is-enabled", vec![exited(0, "enabled\n", "")]);
    shell.on("runuser -u postgres -- psql", vec![exited(0, "", "")]);

    let mut out = Vec::<u8>::new();
    let code = execute(
        Commands::Check {
            manifest: manifest(&dir),
        },
        &Config::default(),
        shell.clone(),
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(code, 2, "{text}");
    assert!(text.contains("would change: role elearning does not exist"), "{text}");
    assert!(text.contains("would change: database elearning does not exist"), "{text}");
    assert!(text.contains("2 of 4 step(s) not satisfied"), "{text}");
    assert!(
        shell
            .calls()
            .iter()
            .all(|call| !call.contains("CREATE") && !call.starts_with("apt-get"))
    );
}

#[tokio::test]
async fn check_on_converged_host_exits_zero() {
    let dir = TempDir::new().unwrap();
    let shell = RecordingShell::new();
    shell.on(
        "dpkg-query",
        vec![exited(
            0,
            "postgresql install ok installed\nredis-server install ok installed\n",
            "",
        )],
    );
    shell.on("systemctl", vec![exited(0, "active\n", "")]);
    shell.on("runuser", vec![exited(0, "1\n", "")]);

    let mut out = Vec::<u8>::new();
    let code = execute(
        Commands::Check {
            manifest: manifest(&dir),
        },
        &Config::default(),
        shell,
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    assert!(String::from_utf8(out).unwrap().contains("0 of 4 step(s) not satisfied"));
}

#[tokio::test]
async fn postgres_user_comes_from_config() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.shell.postgres_user = "pgadmin".into();
    let shell = RecordingShell::new();
    shell.on("dpkg-query", vec![exited(1, "", "")]);
    shell.on("systemctl", vec![exited(3, "inactive\n", "")]);
    shell.on("runuser", vec![exited(0, "1\n", "")]);

    let mut out = Vec::<u8>::new();
    execute(
        Commands::Check {
            manifest: manifest(&dir),
        },
        &config,
        shell.clone(),
        &mut out,
    )
    .await
    .unwrap();

    assert!(
        shell
            .calls()
            .iter()
            .any(|call| call.starts_with("runuser -u pgadmin -- psql"))
    );
}

#[tokio::test]
async fn bundled_demo_manifest_validates() {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/elearning/plan.toml");

    let mut out = Vec::<u8>::new();
    let code = execute(
        Commands::Validate { manifest },
        &Config::default(),
        RecordingShell::new(),
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(code, 0);
    assert!(text.contains("plan valid: 22 step(s)"), "{text}");
    let nginx = text.find("svc-nginx").unwrap();
    let migrate = text.find("migrate").unwrap();
    assert!(migrate < nginx, "{text}");
}
