fn main() -> anyhow::Result<()> {
    seagraph::driver::main()
}
