fn main() -> anyhow::Result<()> {
    pumi::run()
}
