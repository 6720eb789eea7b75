use crate::commands::{with_database, CommandResult, Failure};

pub fn run() -> CommandResult {
    match with_database(|_, _| async { Ok::<(), Failure>(()) }) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
