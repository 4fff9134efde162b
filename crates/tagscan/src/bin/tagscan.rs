use tagscan::cli;
use tagscan::engine::AprilTagEngine;

fn main() {
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let code = cli::run(
        std::env::args_os(),
        AprilTagEngine::new(),
        &mut stdout.lock(),
        &mut stderr.lock(),
    );
    std::process::exit(code);
}
