use std::process::ExitCode;

fn main() -> ExitCode {
    henry_cli::run()
}
