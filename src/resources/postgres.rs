use crate::core::probe::{Executor, Probe, ProbeStatus, Resource};
use crate::process::{CommandSpec, HostShell, run_checked};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_POSTGRES_USER: &str = "postgres";

/// Runs single SQL statements through `psql` as the database superuser's OS
/// account.
#[derive(Clone)]
pub struct Psql {
    os_user: String,
    shell: Arc<dyn HostShell>,
}

impl Psql {
    pub fn new(os_user: impl Into<String>, shell: Arc<dyn HostShell>) -> Self {
        Self {
            os_user: os_user.into(),
            shell,
        }
    }

    fn spec(&self, sql: &str) -> CommandSpec {
        CommandSpec::new("runuser")
            .args(["-u", self.os_user.as_str(), "--", "psql"])
            .args(["-X", "-q", "-v", "ON_ERROR_STOP=1", "-tA", "-c", sql])
    }

    /// True when `sql` returns at least one row.
    async fn exists(&self, sql: &str) -> Result<bool> {
        let output = run_checked(self.shell.as_ref(), &self.spec(sql)).await?;
        Ok(output.stdout.trim() == "1")
    }

    /// Runs `sql`, masking each of `secrets` in logs and errors.
    async fn execute(&self, sql: &str, secrets: &[String]) -> Result<()> {
        let spec = secrets
            .iter()
            .fold(self.spec(sql), |spec, secret| spec.secret(secret.as_str()));
        run_checked(self.shell.as_ref(), &spec).await?;
        Ok(())
    }
}

/// `"ident"` with embedded quotes doubled.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `'literal'` with embedded quotes doubled.
pub fn quote_literal(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}

/// A login role that must exist.
pub struct PgRole {
    name: String,
    password: Option<String>,
    psql: Psql,
}

impl PgRole {
    pub fn new(name: impl Into<String>, psql: Psql) -> Self {
        Self {
            name: name.into(),
            password: None,
            psql,
        }
    }

    /// Password set at creation time only; an existing role is left untouched.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[async_trait]
impl Probe for PgRole {
    async fn check(&self) -> Result<ProbeStatus> {
        let sql = format!(
            "SELECT 1 FROM pg_roles WHERE rolname = {}",
            quote_literal(&self.name)
        );
        if self.psql.exists(&sql).await? {
            Ok(ProbeStatus::Satisfied)
        } else {
            Ok(ProbeStatus::unsatisfied(format!(
                "role {} does not exist",
                self.name
            )))
        }
    }
}

#[async_trait]
impl Executor for PgRole {
    async fn apply(&self) -> Result<()> {
        let mut sql = format!("CREATE ROLE {} LOGIN", quote_ident(&self.name));
        let mut secrets = Vec::new();
        if let Some(password) = &self.password {
            let literal = quote_literal(password);
            sql.push_str(" PASSWORD ");
            sql.push_str(&literal);
            secrets.push(literal);
            secrets.push(password.clone());
        }
        self.psql.execute(&sql, &secrets).await
    }
}

impl Resource for PgRole {
    fn describe(&self) -> String {
        format!("postgres role {} exists", self.name)
    }
}

/// A database that must exist, owned by `owner` when given.
pub struct PgDatabase {
    name: String,
    owner: Option<String>,
    psql: Psql,
}

impl PgDatabase {
    pub fn new(name: impl Into<String>, psql: Psql) -> Self {
        Self {
            name: name.into(),
            owner: None,
            psql,
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[async_trait]
impl Probe for PgDatabase {
    async fn check(&self) -> Result<ProbeStatus> {
        let sql = format!(
            "SELECT 1 FROM pg_database WHERE datname = {}",
            quote_literal(&self.name)
        );
        if self.psql.exists(&sql).await? {
            Ok(ProbeStatus::Satisfied)
        } else {
            Ok(ProbeStatus::unsatisfied(format!(
                "database {} does not exist",
                self.name
            )))
        }
    }
}

#[async_trait]
impl Executor for PgDatabase {
    async fn apply(&self) -> Result<()> {
        let mut sql = format!("CREATE DATABASE {}", quote_ident(&self.name));
        if let Some(owner) = &self.owner {
            sql.push_str(" OWNER ");
            sql.push_str(&quote_ident(owner));
        }
        self.psql.execute(&sql, &[]).await
    }
}

impl Resource for PgDatabase {
    fn describe(&self) -> String {
        format!("postgres database {} exists", self.name)
    }
}
