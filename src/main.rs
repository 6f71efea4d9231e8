//! MJPEG camera server
//!
//! Run with: mjpeg-server [OPTIONS]
//!
//! Examples:
//!   mjpeg-server                                         # test pattern on 0.0.0.0:8000
//!   mjpeg-server --bind localhost:8080                   # binds to 127.0.0.1:8080
//!   mjpeg-server --source file:recording.mjpg
//!   mjpeg-server --source "exec:libcamera-vid -t 0 --codec mjpeg -o -"
//!   ffmpeg -f v4l2 -i /dev/video0 -f mjpeg - | mjpeg-server --source stdin
//!
//! Open http://localhost:8000/ in a browser to watch the stream.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mjpeg_rs::server::config::DEFAULT_PORT;
use mjpeg_rs::source::{self, CameraConfig, SourceConfig};
use mjpeg_rs::{FrameWriter, IndexPage, ServerConfig, StreamServer};
use tokio_util::sync::CancellationToken;

/// Parsed command line
#[derive(Debug)]
struct Options {
    bind_addr: SocketAddr,
    source: SourceConfig,
    camera: CameraConfig,
    page: Option<PathBuf>,
    max_connections: usize,
    idle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            bind_addr: server.bind_addr,
            source: SourceConfig::TestPattern,
            camera: CameraConfig::default(),
            page: None,
            max_connections: server.max_connections,
            idle_timeout: server.idle_timeout,
        }
    }
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8000
/// - "localhost:8080" -> 127.0.0.1:8080
/// - "127.0.0.1" -> 127.0.0.1:8000
/// - ":8080" -> 0.0.0.0:8080
/// - "0.0.0.0:8000" -> 0.0.0.0:8000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");
    let normalized = match normalized.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => normalized,
    };

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT, IP, :PORT or 'localhost'",
        arg
    ))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: '{}'", flag, value))
}

/// Parse arguments (without the program name). `None` means help was asked for.
fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(flag) = iter.next() {
        if flag == "-h" || flag == "--help" {
            return Ok(None);
        }

        let value = iter
            .next()
            .ok_or_else(|| format!("Missing value for {}", flag))?;

        match flag.as_str() {
            "-b" | "--bind" => options.bind_addr = parse_bind_addr(value)?,
            "-s" | "--source" => {
                options.source = value.parse::<SourceConfig>().map_err(|e| format!("{}", e))?;
            }
            "-r" | "--resolution" => {
                let (width, height) =
                    CameraConfig::parse_resolution(value).map_err(|e| format!("{}", e))?;
                options.camera.width = width;
                options.camera.height = height;
            }
            "-f" | "--framerate" => {
                options.camera.framerate = parse_number::<u32>(flag, value)?;
                if options.camera.framerate == 0 {
                    return Err("Frame rate must be at least 1".into());
                }
            }
            "-q" | "--quality" => options.camera.quality = parse_number::<u8>(flag, value)?,
            "-p" | "--page" => options.page = Some(PathBuf::from(value)),
            "--max-connections" => options.max_connections = parse_number::<usize>(flag, value)?,
            "--idle-timeout" => {
                options.idle_timeout = Duration::from_secs(parse_number::<u64>(flag, value)?);
            }
            _ => return Err(format!("Unknown option: {}", flag)),
        }
    }

    Ok(Some(options))
}

fn print_usage() {
    eprintln!("Usage: mjpeg-server [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -b, --bind ADDR            Address to bind to (default: 0.0.0.0:8000)");
    eprintln!("  -s, --source SOURCE        stdin, file:PATH, exec:CMD or pattern (default: pattern)");
    eprintln!("  -r, --resolution WxH       Camera resolution (default: 1640x1232)");
    eprintln!("  -f, --framerate FPS        Camera frame rate (default: 24)");
    eprintln!("  -q, --quality Q            JPEG quality for the test pattern (default: 85)");
    eprintln!("  -p, --page FILE            HTML page served at /index.html");
    eprintln!("      --max-connections N    Stream client limit, 0 = unlimited (default: 0)");
    eprintln!("      --idle-timeout SECS    Drop clients after SECS without a frame, 0 = never (default: 10)");
    eprintln!("  -h, --help                 Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  mjpeg-server --bind localhost:8080");
    eprintln!("  mjpeg-server --source file:recording.mjpg --framerate 30");
    eprintln!("  mjpeg-server --source \"exec:libcamera-vid -t 0 --codec mjpeg -o -\"");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_rs=debug".parse()?)
                .add_directive("mjpeg_server=debug".parse()?),
        )
        .init();

    let page = match &options.page {
        Some(path) => IndexPage::load(path)?,
        None => IndexPage::builtin(options.camera.width, options.camera.height),
    };

    let config = ServerConfig::with_addr(options.bind_addr)
        .max_connections(options.max_connections)
        .idle_timeout(options.idle_timeout);

    let writer = FrameWriter::new();
    let server = StreamServer::with_page(config, writer.buffer(), page);

    println!("Starting MJPEG server on {}", server.bind_addr());
    println!("Source: {}", options.source);
    println!();
    println!("Watch:  http://localhost:{}/", server.bind_addr().port());
    println!();

    let producer = source::spawn(options.source, options.camera, writer)?;

    // The producer thread logs its own outcome; here we only need to know it ended
    let producer_stopped = CancellationToken::new();
    let stopped = producer_stopped.clone();
    std::thread::Builder::new()
        .name("producer-watch".into())
        .spawn(move || {
            if producer.join().is_err() {
                tracing::error!("Frame producer panicked");
            }
            stopped.cancel();
        })?;

    let stopped = producer_stopped.clone();
    let result = server
        .run_until(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("\nShutting down...");
                }
                _ = stopped.cancelled() => {}
            }
        })
        .await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    // Without frames there is nothing left to serve
    if producer_stopped.is_cancelled() {
        std::process::exit(1);
    }

    Ok(())
}
