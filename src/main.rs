use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match taskpilot_cli::cli::app::run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
