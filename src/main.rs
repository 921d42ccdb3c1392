//! a68 entry point.

fn main() {
    std::process::exit(a68::cli::run_cli());
}
