use std::process::ExitCode;

fn main() -> ExitCode {
    firmscope_cli::run()
}
