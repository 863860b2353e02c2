fn main() -> Result<(), Box<dyn std::error::Error>> {
    super_okai::cli::main()
}
