fn main() {
    footprint_pipeline::cli::run();
}
