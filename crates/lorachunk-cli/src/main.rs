mod payload;
mod settings;

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use lorachunk::{
    CancelToken, ReceiveOutcome, ReceiverConfig, SendOutcome, SenderConfig, StreamTransport,
    SystemClock, TracingLogger, TransferError, Transport, UdpTransport,
};

use payload::{FileSink, FileSource, sha256_hex};
use settings::{Link, Settings};

fn print_usage() {
    println!("lorachunk - chunked file transfer over a half-duplex radio link");
    println!();
    println!("USAGE:");
    println!("  lorachunk [--env <file>] <command>");
    println!();
    println!("COMMANDS:");
    println!("  send <file>       Fragment <file> and send it, one frame at a time");
    println!("  receive <file>    Wait for a transfer and write the payload to <file>");
    println!("  help              Show this message");
    println!();
    println!("ENVIRONMENT (also read from .env):");
    println!("  LORACHUNK_LINK              udp | device           (default udp)");
    println!("  LORACHUNK_UDP_BIND          local address          (default 0.0.0.0:7400)");
    println!("  LORACHUNK_UDP_PEER          peer address           (default 127.0.0.1:7401)");
    println!("  LORACHUNK_DEVICE            serial device path     (default /dev/ttyUSB0)");
    println!("  LORACHUNK_CHUNK_SIZE        payload bytes/frame    (default 128)");
    println!("  LORACHUNK_MAX_MESSAGE_LEN   link message bound     (default 200)");
    println!("  LORACHUNK_ACK_TIMEOUT_MS    ack wait per attempt   (default 2000)");
    println!("  LORACHUNK_MAX_RETRIES       attempts per frame     (default 5)");
    println!("  LORACHUNK_POLL_INTERVAL_MS  receive poll interval  (default 100)");
    println!("  LORACHUNK_IDLE_TIMEOUT_MS   receiver idle limit    (default 0 = none)");
    println!("  LORACHUNK_PAYLOAD_ENCODING  raw | base64           (default raw)");
}

// ── Interrupts ───────────────────────────────────────────────────────────────

/// Trip `cancel` on Ctrl+C, or SIGTERM on unix.
///
/// The transfer itself is synchronous; a current-thread runtime on its own
/// thread only waits for the signal.
fn watch_interrupts(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    std::thread::Builder::new()
        .name("lorachunk-signal".into())
        .spawn(move || {
            runtime.block_on(shutdown_signal());
            cancel.cancel();
        })
        .context("failed to spawn signal watcher")?;
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => info!("Received Ctrl+C, stopping transfer..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, stopping transfer..."),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c().await;
                info!("Received Ctrl+C, stopping transfer...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, stopping transfer...");
    }
}

/// `None` when the transfer was cancelled, so callers can exit quietly.
fn unless_interrupted<T>(result: Result<T, TransferError>) -> Result<Option<T>, TransferError> {
    match result {
        Err(TransferError::Cancelled) => Ok(None),
        other => other.map(Some),
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn open_link(settings: &Settings) -> Result<Box<dyn Transport + Send>> {
    let mut link: Box<dyn Transport + Send> = match &settings.link {
        Link::Udp { bind, peer } => {
            Box::new(UdpTransport::new(*bind, *peer, settings.max_message_len))
        }
        Link::Device { path } => {
            let device = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("failed to open device {}", path.display()))?;
            let writer = device
                .try_clone()
                .context("failed to clone device handle")?;
            Box::new(StreamTransport::new(device, writer, settings.max_message_len))
        }
    };
    link.open().context("failed to open link")?;
    info!(link = ?settings.link, max_message_len = settings.max_message_len, "link open");
    Ok(link)
}

/// Send `payload` over an open link. `Ok(false)` if interrupted.
fn send_payload<T>(link: &mut T, payload: &[u8], config: &SenderConfig) -> Result<bool>
where
    T: Transport + ?Sized,
{
    let outcome = lorachunk::run_sender(link, &SystemClock::new(), payload, config);
    let Some(outcome) = unless_interrupted(outcome).context("transfer aborted")? else {
        return Ok(false);
    };

    match outcome {
        SendOutcome::Success(report) => {
            println!(
                "sent {} bytes in {} frames ({} retransmits, {} B/s)",
                report.stats.bytes_acked,
                report.total_chunks,
                report.stats.retransmits,
                report.stats.throughput_bps(report.elapsed)
            );
            Ok(true)
        }
        failed @ SendOutcome::PartialFailure { .. } => {
            failed.into_result().map(|_| true).context("transfer failed")
        }
    }
}

/// Receive one transfer and store it. `Ok(None)` if interrupted; nothing is
/// written unless every chunk arrived.
fn receive_to_sink<T>(link: &mut T, sink: &FileSink, config: &ReceiverConfig) -> Result<Option<usize>>
where
    T: Transport + ?Sized,
{
    let outcome = lorachunk::receive_transfer(link, &SystemClock::new(), config);
    let Some(outcome) = unless_interrupted(outcome).context("reception aborted")? else {
        return Ok(None);
    };

    match outcome {
        ReceiveOutcome::Assembled { payload, report } => {
            info!(bytes = payload.len(), sha256 = %sha256_hex(&payload), "payload assembled");
            let written = sink.store(&payload)?;
            println!(
                "received {} frames, wrote {} bytes to {}",
                report.total_chunks,
                written,
                sink.path().display()
            );
            Ok(Some(written))
        }
        incomplete @ ReceiveOutcome::Incomplete { .. } => {
            incomplete.into_result().map(|_| None).context("transfer incomplete")
        }
    }
}

fn cmd_send(settings: &Settings, path: &str) -> Result<()> {
    let payload = FileSource::new(path, settings.encoding).load()?;
    info!(
        file = path,
        bytes = payload.len(),
        sha256 = %sha256_hex(&payload),
        "sending payload"
    );

    let config = SenderConfig {
        transfer: settings.transfer.clone(),
        logger: Some(Arc::new(TracingLogger)),
        ..Default::default()
    };
    watch_interrupts(config.cancel.clone())?;

    let mut link = open_link(settings)?;
    let result = send_payload(&mut *link, &payload, &config);
    if let Err(e) = link.close() {
        warn!(error = %e, "failed to close link");
    }
    if !result? {
        warn!("Sender interrupted. Exiting.");
    }
    Ok(())
}

fn cmd_receive(settings: &Settings, path: &str) -> Result<()> {
    let sink = FileSink::new(path, settings.encoding);

    let config = ReceiverConfig {
        transfer: settings.transfer.clone(),
        logger: Some(Arc::new(TracingLogger)),
        ..Default::default()
    };
    watch_interrupts(config.cancel.clone())?;

    let mut link = open_link(settings)?;
    info!(file = path, "waiting for transfer");
    let result = receive_to_sink(&mut *link, &sink, &config);
    if let Err(e) = link.close() {
        warn!(error = %e, "failed to close link");
    }
    if result?.is_none() {
        warn!("Receiver interrupted. Exiting.");
    }
    Ok(())
}

/// Send or receive one file over a radio link.
fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --env option
    let mut env_file: Option<String> = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--env" {
            i += 1;
            env_file = Some(args.get(i).context("--env requires a path")?.clone());
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match &env_file {
        Some(file) => {
            dotenvy::from_path(file).with_context(|| format!("failed to load {}", file))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lorachunk=info,lorachunk_cli=info".into()),
        )
        .init();

    match remaining.as_slice() {
        ["send", file] => cmd_send(&Settings::from_env()?, file),
        ["receive", file] => cmd_receive(&Settings::from_env()?, file),
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
