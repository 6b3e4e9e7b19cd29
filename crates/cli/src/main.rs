use std::process::ExitCode;

fn main() -> ExitCode {
    b24desk_cli::run()
}
