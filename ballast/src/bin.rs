fn main() {
    std::process::exit(ballast::run(std::env::args_os()));
}
