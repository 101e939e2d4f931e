//! Built-in probe/executor pairs for the collaborators a single host needs:
//! the package manager, the service manager, the filesystem and PostgreSQL.
//!
//! Every resource that runs an external program does so through a
//! [`HostShell`](crate::process::HostShell), so none of them reimplements the
//! collaborator and all of them can be exercised against a scripted shell.

mod command;
mod file;
mod package;
mod postgres;
mod service;

pub use command::{Guard, GuardedCommand};
pub use file::{Directory, EnvFile, File, Symlink, render_env_file};
pub use package::Package;
pub use postgres::{DEFAULT_POSTGRES_USER, PgDatabase, PgRole, Psql, quote_ident, quote_literal};
pub use service::Service;
