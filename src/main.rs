use std::process::ExitCode;

use atlas_fs::output as out;

mod app;
mod logging;
mod shutdown;

fn main() -> ExitCode {
    let args = atlas_fs::cli::parse();
    match app::run(args) {
        Ok(code) => code,
        Err(e) => {
            out::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
