fn main() -> Result<(), Box<dyn std::error::Error>> {
    hubtools::cli::main()
}
