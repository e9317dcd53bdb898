use std::process::ExitCode;

fn main() -> ExitCode {
    match medintake_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("medintake: {e}");
            ExitCode::FAILURE
        }
    }
}
