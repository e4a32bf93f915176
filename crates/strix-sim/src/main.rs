//! strix-sim: synthetic telemetry feeder.
//!
//! Serves generated events to a listening strix pipeline so the socket and
//! websocket ingest transports can be exercised end to end:
//!
//!   strix-sim tcp --bind 127.0.0.1:8888 --eps 50 --scenario error-burst
//!   strix-sim websocket --bind 127.0.0.1:8765 --scenario ip-flood
//!   strix-sim stdout --eps 5 --duration 30

mod scenarios;

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scenarios::{Scenario, ShapedGenerator};

#[derive(Parser)]
#[command(name = "strix-sim")]
#[command(about = "Synthetic telemetry feeder for strix ingest transports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct StreamOpts {
    /// Events per second per client
    #[arg(short, long, default_value = "10.0")]
    eps: f64,

    /// Probability of a randomly anomalous event
    #[arg(short, long, default_value = "0.05")]
    anomaly_probability: f64,

    /// Stop after this many seconds (0 = run until killed)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Fault pattern to overlay
    #[arg(short, long, value_enum, default_value = "steady")]
    scenario: Scenario,

    /// Seconds before the fault window opens
    #[arg(long, default_value = "30")]
    inject_after: u64,

    /// Fault window length in seconds
    #[arg(long, default_value = "30")]
    inject_duration: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve newline-delimited JSON events over TCP
    Tcp {
        #[arg(short, long, default_value = "127.0.0.1:8888")]
        bind: String,

        #[command(flatten)]
        opts: StreamOpts,
    },

    /// Serve JSON text frames over WebSocket
    Websocket {
        #[arg(short, long, default_value = "127.0.0.1:8765")]
        bind: String,

        #[command(flatten)]
        opts: StreamOpts,
    },

    /// Print newline-delimited JSON events to stdout
    Stdout {
        #[command(flatten)]
        opts: StreamOpts,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Tcp { bind, opts } => run_tcp(&bind, opts),
        Commands::Websocket { bind, opts } => run_websocket(&bind, opts),
        Commands::Stdout { opts } => run_stdout(opts),
    }
}

fn run_tcp(bind: &str, opts: StreamOpts) {
    let listener = match TcpListener::bind(bind) {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %bind, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(bind = %bind, scenario = ?opts.scenario, "tcp feeder listening");

    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let opts = opts.clone();
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                std::thread::spawn(move || {
                    info!(peer = %peer, "client connected");
                    feed_tcp_client(stream, opts);
                    info!(peer = %peer, "client finished");
                });
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

fn feed_tcp_client(mut stream: TcpStream, opts: StreamOpts) {
    let mut generator = ShapedGenerator::new(
        opts.anomaly_probability,
        opts.scenario,
        opts.inject_after,
        opts.inject_duration,
    );
    let interval = Duration::from_secs_f64(1.0 / opts.eps.max(0.001));
    let started = Instant::now();

    loop {
        if opts.duration > 0 && started.elapsed() >= Duration::from_secs(opts.duration) {
            break;
        }
        let event = generator.next_event();
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(_) => continue,
        };
        if stream.write_all(line.as_bytes()).is_err() || stream.write_all(b"\n").is_err() {
            break;
        }
        if generator.event_count() % 1000 == 0 {
            info!(events = generator.event_count(), "feeder progress");
        }
        std::thread::sleep(interval);
    }
}

fn run_websocket(bind: &str, opts: StreamOpts) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(bind = %bind, error = %e, "failed to bind");
                std::process::exit(1);
            }
        };
        info!(bind = %bind, scenario = ?opts.scenario, "websocket feeder listening");

        loop {
            let (conn, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let opts = opts.clone();
            tokio::spawn(async move {
                info!(peer = %peer, "client connected");
                if let Err(e) = feed_ws_client(conn, opts).await {
                    warn!(peer = %peer, error = %e, "client dropped");
                }
            });
        }
    });
}

async fn feed_ws_client(
    conn: tokio::net::TcpStream,
    opts: StreamOpts,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut ws = tokio_tungstenite::accept_async(conn).await?;
    let mut generator = ShapedGenerator::new(
        opts.anomaly_probability,
        opts.scenario,
        opts.inject_after,
        opts.inject_duration,
    );
    let interval = Duration::from_secs_f64(1.0 / opts.eps.max(0.001));
    let started = Instant::now();

    loop {
        if opts.duration > 0 && started.elapsed() >= Duration::from_secs(opts.duration) {
            let _ = ws.close(None).await;
            return Ok(());
        }
        let event = generator.next_event();
        let frame = serde_json::to_string(&event).unwrap_or_default();
        ws.send(Message::Text(frame.into())).await?;
        tokio::time::sleep(interval).await;
    }
}

fn run_stdout(opts: StreamOpts) {
    let mut generator = ShapedGenerator::new(
        opts.anomaly_probability,
        opts.scenario,
        opts.inject_after,
        opts.inject_duration,
    );
    let interval = Duration::from_secs_f64(1.0 / opts.eps.max(0.001));
    let started = Instant::now();
    let stdout = std::io::stdout();

    loop {
        if opts.duration > 0 && started.elapsed() >= Duration::from_secs(opts.duration) {
            break;
        }
        let event = generator.next_event();
        if let Ok(line) = serde_json::to_string(&event) {
            let mut lock = stdout.lock();
            if writeln!(lock, "{}", line).is_err() {
                break;
            }
        }
        std::thread::sleep(interval);
    }
    info!(events = generator.event_count(), "stdout feeder finished");
}
