use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match hanzi_server::start_server().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hanzi-server: {e}");
            ExitCode::FAILURE
        }
    }
}
