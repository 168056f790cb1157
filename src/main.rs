fn main() {
    phd_utils::cli::run();
}
