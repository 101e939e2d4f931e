pub mod dispatch;

pub use dispatch::{EXIT_CONFIGURATION, EXIT_OTHER, dispatch, execute, exit_code_for};
