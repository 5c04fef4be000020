use app::Task;
use chrono::Utc;
use clap_app::Cli;

mod app;
mod clap_app;

fn main() {
    std::process::exit(match Cli::build().and_then(|app| app.run()) {
        Ok(()) => {
            println!("{} End", Utc::now());
            0
        }
        Err(err) => {
            eprintln!("{} Error: {:?}", Utc::now(), err);
            1
        }
    });
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;

    Cli::command().debug_assert()
}
