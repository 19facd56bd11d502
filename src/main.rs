fn main() -> anyhow::Result<()> {
    keyledger::app::run()
}
