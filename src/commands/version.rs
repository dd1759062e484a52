pub fn run() -> anyhow::Result<()> {
    println!("kube-perftest {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
