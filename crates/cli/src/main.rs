use std::process::ExitCode;

fn main() -> ExitCode {
    overburden_cli::run()
}
