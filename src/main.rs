fn main() {
    std::process::exit(diagcheck::cli::run());
}
