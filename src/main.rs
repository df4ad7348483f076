use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, bounded};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tcpcarve::capture::PacketSource;
use tcpcarve::engine::{CommandOutcome, DEFAULT_IDLE_TIMEOUT, Engine};
use tcpcarve::signatures::{SignatureTable, builtin_specs, load_specs};

/// Payloads dispatched before the command channel is polled.
const DISPATCH_BATCH: usize = 100;

#[derive(Parser)]
#[command(name = "tcpcarve")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Carves files out of TCP payloads in packet captures")]
struct Cli {
    /// Capture file to process (pcap or pcapng)
    #[arg(short, long)]
    file: PathBuf,

    /// Directory that receives extracted files and the index
    #[arg(short, long, default_value = "./extracted")]
    output: PathBuf,

    /// JSON signature file; the built-in set is used when omitted
    #[arg(short = 'c', long)]
    signatures: Option<PathBuf>,

    /// Session idle timeout in seconds
    #[arg(short = 't', long, default_value_t = DEFAULT_IDLE_TIMEOUT)]
    timeout: u64,

    /// Log every match as it is found
    #[arg(short, long)]
    verbose: bool,

    /// Extra session-table chatter
    #[arg(short = 'D', long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let specs = match &cli.signatures {
        Some(path) => load_specs(path)?,
        None => builtin_specs(),
    };
    let table = SignatureTable::compile(&specs).context("signature compile failed")?;
    info!(
        "{} signatures compiled, {} rejected",
        table.loaded(),
        table.rejected()
    );

    let source_name = cli.file.display().to_string();
    let mut engine = Engine::new(table, &cli.output, &source_name, cli.timeout)?;
    engine.set_verbose(cli.verbose);
    engine.set_debug(cli.debug);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("failed to install signal handler")?;
    }
    let commands = spawn_command_reader();

    let mut source = PacketSource::open(&cli.file)
        .with_context(|| format!("failed to open capture {:?}", cli.file))?;

    run(&mut engine, &mut source, &commands, &shutdown)?;

    engine.shutdown()?;
    Ok(())
}

fn run(
    engine: &mut Engine,
    source: &mut PacketSource,
    commands: &Receiver<u8>,
    shutdown: &AtomicBool,
) -> Result<()> {
    'outer: loop {
        // a bounded batch of payloads, then at most one pending command
        for _ in 0..DISPATCH_BATCH {
            if shutdown.load(Ordering::SeqCst) {
                info!("interrupted, shutting down");
                break 'outer;
            }
            match source.next_payload(engine.stats_mut())? {
                Some(p) => engine.process_payload(p.tuple, &p.data, p.ts),
                None => {
                    info!("capture exhausted");
                    break 'outer;
                }
            }
        }
        if let Ok(cmd) = commands.try_recv() {
            if let CommandOutcome::Quit = engine.handle_command(cmd) {
                info!("operator quit");
                break;
            }
        }
    }
    Ok(())
}

/// Reads operator keystrokes off stdin on a side thread; the dispatch
/// loop polls the channel so the capture path never blocks on input.
fn spawn_command_reader() -> Receiver<u8> {
    let (tx, rx) = bounded(16);
    thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1];
        while let Ok(n) = stdin.read(&mut buf) {
            if n == 0 {
                break;
            }
            if buf[0] == b'\n' {
                continue;
            }
            if tx.send(buf[0]).is_err() {
                break;
            }
        }
    });
    rx
}
