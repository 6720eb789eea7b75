use std::process::ExitCode;

fn main() -> ExitCode {
    vinoteka_cli::run()
}
