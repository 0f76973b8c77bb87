use std::process::ExitCode;

fn main() -> ExitCode {
    crashdesk_cli::run()
}
