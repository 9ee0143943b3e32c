//! QuickDrop CLI
//!
//! Send and receive files, text and URLs with Quick Share compatible devices.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::MultiProgress;
use quickdrop_core::{
    Error, FileProgress, InboundDelegate, OutboundDelegate, ShareTarget, TextKind, TransferId,
    TransferManager, TransferMetadata,
};
use quickdrop_discovery::{EndpointId, EndpointInfo, RemoteDeviceInfo, SERVICE_TYPE, service};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use config::Config;
use progress::{TransferProgress, format_bytes, summary};

/// QuickDrop - Quick Share compatible file transfer
#[derive(Parser)]
#[command(name = "quickdrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixed 4-character endpoint ID instead of a random one
    #[arg(long, global = true)]
    endpoint_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive files, text and URLs
    Receive {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Accept every transfer without asking
        #[arg(short, long)]
        yes: bool,

        /// Advertise a QR pairing token and print its URL
        #[arg(long)]
        qr: bool,
    },

    /// Send files or a URL to a device
    Send {
        /// Receiver address (host:port)
        #[arg(required = true)]
        addr: SocketAddr,

        /// Files to send, or a single http(s) URL
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Print the mDNS service type, instance name and TXT record to publish
    Advertise {
        /// Port the receiver listens on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show device identity and configuration
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(level).init();

    let endpoint_id = match &cli.endpoint_id {
        Some(id) => id.parse::<EndpointId>()?,
        None => EndpointId::random(),
    };

    match cli.command {
        Commands::Receive {
            output,
            bind,
            yes,
            qr,
        } => {
            receive(endpoint_id, output, bind, yes, qr, &config).await?;
        }
        Commands::Send { addr, targets } => {
            send(endpoint_id, addr, targets, &config).await?;
        }
        Commands::Advertise { port } => {
            advertise(&endpoint_id, port, &config)?;
        }
        Commands::Info => {
            show_info(&endpoint_id, &config);
        }
    }

    Ok(())
}

fn print_advertisement(service_name: &str, txt: &(String, String), port: u16) {
    println!("Service type: {SERVICE_TYPE}");
    println!("Instance:     {service_name}");
    println!("TXT:          {}={}", txt.0, txt.1);
    println!("Port:         {port}");
}

// ============ Receive ============

enum ReceiveEvent {
    Consent { id: TransferId, prompt: String },
    Finished { id: TransferId, error: Option<Error> },
}

struct Receiver {
    events: mpsc::UnboundedSender<ReceiveEvent>,
    multi: MultiProgress,
    bars: Mutex<HashMap<(TransferId, i64), TransferProgress>>,
}

impl InboundDelegate for Receiver {
    fn obtain_user_consent(&self, transfer: &TransferMetadata, device: &RemoteDeviceInfo) {
        let prompt = format!(
            "{} ({}) wants to send {} ({})\nPIN: {}",
            style(&device.name).bold(),
            device.device_type,
            transfer.describe(),
            format_bytes(transfer.total_size()),
            style(&transfer.pin).bold().cyan()
        );
        let _ = self.events.send(ReceiveEvent::Consent {
            id: transfer.id.clone(),
            prompt,
        });
    }

    fn incoming_transfer_finished(&self, id: &str, error: Option<Error>) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.retain(|(transfer, _), bar| {
            if transfer == id {
                bar.abandon();
                false
            } else {
                true
            }
        });
        drop(bars);
        let _ = self.events.send(ReceiveEvent::Finished {
            id: id.to_string(),
            error,
        });
    }

    fn received_text(&self, _id: &str, kind: TextKind, text: &str) {
        println!("Received {kind}: {}", style(text).underlined());
    }

    fn transfer_progress(&self, id: &str, progress: FileProgress) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (id.to_string(), progress.payload_id);
        let bar = bars.entry(key.clone()).or_insert_with(|| {
            TransferProgress::in_group(
                &self.multi,
                progress.bytes_total,
                &format!("file {}", progress.payload_id),
            )
        });
        bar.update(progress.bytes_received);
        if progress.is_complete() {
            bar.finish_with_message(format!("Received file {}", progress.payload_id));
            bars.remove(&key);
        }
    }
}

async fn receive(
    endpoint_id: EndpointId,
    output: Option<PathBuf>,
    bind: Option<String>,
    yes: bool,
    qr: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let mut engine = config.engine_config();
    if let Some(dir) = output {
        engine = engine.with_download_dir(dir);
    }
    if !engine.download_dir.exists() {
        std::fs::create_dir_all(&engine.download_dir)?;
    }
    let auto_accept = yes || config.transfer.auto_accept;
    let bind = bind.unwrap_or_else(|| config.network.listen_addr.clone());
    let download_dir = engine.download_dir.clone();

    let (tx, mut events) = mpsc::unbounded_channel();
    let delegate = Arc::new(Receiver {
        events: tx,
        multi: MultiProgress::new(),
        bars: Mutex::new(HashMap::new()),
    });
    let manager = TransferManager::with_endpoint_id(engine, endpoint_id, delegate);

    let listener = TcpListener::bind(&bind).await?;
    let local = listener.local_addr()?;
    tracing::info!(%local, "Listening for transfers");

    println!("Device: {}", manager.config().device_name);
    println!("Saving to: {}", download_dir.display());
    print_advertisement(&manager.service_name(), &manager.txt_record()?, local.port());
    if qr {
        let url = manager.enable_qr_pairing()?;
        println!("QR URL:       {url}");
        println!("TXT (QR):     {}", manager.txt_record()?.1);
    }
    println!("\nReady to receive. Press Ctrl+C to stop");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: VecDeque<TransferId> = VecDeque::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let id = manager.accept_inbound(stream);
                tracing::info!(%peer, transfer = %id, "Incoming connection");
            }
            Some(event) = events.recv() => match event {
                ReceiveEvent::Consent { id, prompt } => {
                    println!("\n{prompt}");
                    if auto_accept {
                        manager.submit_user_consent(&id, true);
                    } else {
                        println!("Accept? [y/N]");
                        pending.push_back(id);
                    }
                }
                ReceiveEvent::Finished { id, error } => {
                    pending.retain(|p| p != &id);
                    match error {
                        None => println!("{} Transfer {id} complete", style("✓").green()),
                        Some(e) if e.is_canceled() => {
                            println!("Transfer {id} ended: {}", e.user_message());
                        }
                        Some(e) => eprintln!("{} Transfer {id} failed: {e}", style("✗").red()),
                    }
                }
            },
            line = stdin.next_line(), if !pending.is_empty() => {
                let line = line?;
                let accept = matches!(
                    line.as_deref().map(str::trim),
                    Some("y" | "Y" | "yes")
                );
                if let Some(id) = pending.pop_front() {
                    manager.submit_user_consent(&id, accept);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    Ok(())
}

// ============ Send ============

enum SendEvent {
    Established(String),
    Accepted,
    Done(Option<Error>),
}

struct Sender {
    events: mpsc::UnboundedSender<SendEvent>,
    progress: TransferProgress,
}

impl OutboundDelegate for Sender {
    fn connection_established(&self, pin: &str) {
        let _ = self.events.send(SendEvent::Established(pin.to_string()));
    }

    fn transfer_accepted(&self) {
        let _ = self.events.send(SendEvent::Accepted);
    }

    fn transfer_progress(&self, fraction: f64) {
        self.progress.update_fraction(fraction);
    }

    fn transfer_finished(&self) {
        let _ = self.events.send(SendEvent::Done(None));
    }

    fn connection_failed(&self, error: Error) {
        let _ = self.events.send(SendEvent::Done(Some(error)));
    }
}

async fn send(
    endpoint_id: EndpointId,
    addr: SocketAddr,
    targets: Vec<String>,
    config: &Config,
) -> anyhow::Result<()> {
    let target = ShareTarget::from_args(&targets)?;
    let (total, label) = match &target {
        ShareTarget::Files(paths) => {
            let mut total = 0;
            for path in paths {
                if !path.is_file() {
                    anyhow::bail!("File not found: {}", path.display());
                }
                total += std::fs::metadata(path)?.len();
            }
            let label = match paths.as_slice() {
                [single] => single.display().to_string(),
                many => format!("{} files", many.len()),
            };
            (total, label)
        }
        ShareTarget::Url(url) => (url.as_str().len() as u64, url.to_string()),
    };

    println!("Sending: {label}");
    println!("Size: {}", format_bytes(total));
    println!("Receiver: {addr}");

    let (tx, mut events) = mpsc::unbounded_channel();
    let delegate = Arc::new(Sender {
        events: tx,
        progress: TransferProgress::new(total, &label),
    });
    let manager = TransferManager::with_endpoint_id(
        config.engine_config(),
        endpoint_id,
        Arc::new(RejectAll),
    );

    let handle = manager
        .start_outbound_transfer_to(addr, target, delegate.clone())
        .await?;
    let started = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SendEvent::Established(pin)) => {
                    delegate.progress.set_message(format!(
                        "Waiting for {addr} to accept. PIN: {}",
                        style(pin).bold().cyan()
                    ));
                }
                Some(SendEvent::Accepted) => {
                    delegate.progress.set_message(format!("Transferring: {label}"));
                }
                Some(SendEvent::Done(None)) => {
                    delegate
                        .progress
                        .finish_with_message(format!("Sent {}", summary(total, started.elapsed())));
                    return Ok(());
                }
                Some(SendEvent::Done(Some(error))) => {
                    delegate.progress.abandon();
                    tracing::debug!(%error, "Transfer failed");
                    anyhow::bail!("{}: {error}", error.user_message());
                }
                None => anyhow::bail!("Transfer task ended unexpectedly"),
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_canceled() => {
                println!("\nCanceling...");
                handle.cancel();
            }
        }
    }
}

/// Inbound side of a send-only process
struct RejectAll;

impl InboundDelegate for RejectAll {
    fn obtain_user_consent(&self, transfer: &TransferMetadata, _device: &RemoteDeviceInfo) {
        tracing::warn!(transfer = %transfer.id, "Unexpected inbound transfer while sending");
    }

    fn incoming_transfer_finished(&self, _id: &str, _error: Option<Error>) {}
}

// ============ Advertise / Info ============

fn advertise(endpoint_id: &EndpointId, port: Option<u16>, config: &Config) -> anyhow::Result<()> {
    let engine = config.engine_config();
    let mut info = EndpointInfo::new(engine.device_name, engine.device_type);
    info.hidden = engine.hidden;

    let port = match port {
        Some(port) => port,
        None => config.parse_listen_addr()?.port(),
    };
    print_advertisement(
        &service::encode_service_name(endpoint_id),
        &service::txt_record(&info)?,
        port,
    );
    println!("\nRun `quickdrop --endpoint-id {endpoint_id} receive` to accept connections");
    Ok(())
}

fn show_info(endpoint_id: &EndpointId, config: &Config) {
    let engine = config.engine_config();

    println!("QuickDrop");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Device:");
    println!("  Endpoint ID: {endpoint_id}");
    println!("  Service name: {}", service::encode_service_name(endpoint_id));
    println!("  Name: {}", engine.device_name);
    println!("  Type: {}", engine.device_type);
    println!("  Hidden: {}", engine.hidden);
    println!();

    println!("Configuration:");
    println!("  File: {}", Config::default_path().display());
    println!("  Listen: {}", config.network.listen_addr);
    println!("  Download dir: {}", engine.download_dir.display());
    println!("  Chunk size: {}", format_bytes(engine.chunk_size as u64));
    println!("  Auto-accept: {}", config.transfer.auto_accept);
}
