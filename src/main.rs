use clap::Parser;

fn main() {
    let args = sd::cli::Args::parse();
    if let Err(err) = sd::run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
