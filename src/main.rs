fn main() -> anyhow::Result<()> {
    forgeops::cli::run()
}
