mod error;
mod infra;
mod runtime;
mod vehicle;

use std::process::ExitCode;

fn main() -> ExitCode {
    runtime::run_from_args()
}
