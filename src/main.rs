use clap::Parser;

/// Fragments targeted TLS ClientHellos at the IP layer to defeat SNI-based DPI throttling.
///
/// Reads packets from the given NFQUEUE queue number; the caller is responsible for the
/// firewall rule that diverts traffic into it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// NFQUEUE queue number to bind.
    queue_num: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args.queue_num) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(queue_num: u32) -> anyhow::Result<()> {
    let runtime = gvfrag::runtime::Runtime::new(queue_num)?;
    runtime.run()
}
