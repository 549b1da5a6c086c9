use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::directive::Speeds;
use crate::endpoint::{Endpoint, Timeouts};
use crate::error::TlsError;
use crate::tls::{TlsContext, Trust};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "teleop-poll",
    about = "Poll a remote controller over TLS and drive the robot base"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Poll the controller every interval and drive the base
    Poll(PollOpts),
    /// Run one exchange and print the reply body
    Fetch(FetchOpts),
}

#[derive(Args, Debug, Clone)]
pub struct EndpointOpts {
    /// Controller host name or address
    #[arg(long, default_value = "10.0.126.100")]
    pub host: String,
    /// Controller port
    #[arg(long, default_value_t = 5000)]
    pub port: u16,
    /// Request path
    #[arg(long, default_value = "/command")]
    pub path: String,
    /// Request body, sent verbatim
    #[arg(long, default_value = r#"{"A":"111", "B":"222"}"#)]
    pub body: String,
    /// Max reply body bytes kept per cycle
    #[arg(long, default_value_t = 512)]
    pub capacity: usize,
}

impl EndpointOpts {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.host, self.port, &self.path)
    }
}

#[derive(Args, Debug, Clone)]
pub struct TlsOpts {
    /// PEM file with the trust anchors for the controller certificate
    #[arg(long, conflicts_with = "insecure")]
    pub ca_file: Option<PathBuf>,
    /// Accept any controller certificate
    #[arg(long, default_value_t = false)]
    pub insecure: bool,
    /// Name to verify the certificate against (defaults to --host)
    #[arg(long)]
    pub server_name: Option<String>,
}

impl TlsOpts {
    pub fn trust(&self) -> anyhow::Result<Trust> {
        match (&self.ca_file, self.insecure) {
            (Some(path), _) => {
                let pem = std::fs::read(path)
                    .with_context(|| format!("reading CA file {}", path.display()))?;
                Ok(Trust::CaPem(pem))
            }
            (None, true) => Ok(Trust::AnyServer),
            (None, false) => Err(TlsError::ContextInitFailed(
                "no trust anchors: pass --ca-file or --insecure".into(),
            )
            .into()),
        }
    }

    pub fn context(&self, timeouts: &Timeouts) -> anyhow::Result<TlsContext> {
        let ctx = TlsContext::new(&self.trust()?, timeouts.entropy)?;
        Ok(ctx.with_server_name(self.server_name.clone()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct TimeoutOpts {
    /// TCP connect timeout per address
    #[arg(long, default_value_t = 3000, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout_ms: u64,
    /// Timeout of each socket read/write (handshake included)
    #[arg(long, default_value_t = 3000, value_parser = clap::value_parser!(u64).range(1..))]
    pub io_timeout_ms: u64,
    /// How long to wait for the OS entropy source
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
    pub entropy_timeout_ms: u64,
}

impl TimeoutOpts {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            io: Duration::from_millis(self.io_timeout_ms),
            entropy: Duration::from_millis(self.entropy_timeout_ms),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DriveOpts {
    /// Serial device of the base bridge; log only when absent
    #[arg(long = "drive-dev")]
    pub dev: Option<String>,
    /// Baud rate of the base bridge
    #[arg(long = "drive-baud", default_value_t = 9600)]
    pub baud: u32,
    /// Linear speed for forward/backward, mm/s
    #[arg(long, default_value_t = 100)]
    pub linear_mm_s: i32,
    /// Angular speed for turns, deg/s
    #[arg(long, default_value_t = 30)]
    pub angular_deg_s: i32,
}

impl DriveOpts {
    pub fn speeds(&self) -> Speeds {
        Speeds {
            linear: self.linear_mm_s,
            angular: self.angular_deg_s,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PollOpts {
    #[command(flatten)]
    pub endpoint: EndpointOpts,
    #[command(flatten)]
    pub tls: TlsOpts,
    #[command(flatten)]
    pub timeouts: TimeoutOpts,
    #[command(flatten)]
    pub drive: DriveOpts,
    /// Delay between cycles in milliseconds
    #[arg(long, default_value_t = 4)]
    pub interval_ms: u64,
    /// "continue" (log and poll again) or "exit" on a failed cycle
    #[arg(long, default_value = "continue")]
    pub on_error: String,
    /// Stop after this many cycles
    #[arg(long)]
    pub cycles: Option<u64>,
    /// Stats log interval in seconds
    #[arg(long, default_value_t = 10.0)]
    pub stats: f64,
}

#[derive(Args, Debug, Clone)]
pub struct FetchOpts {
    #[command(flatten)]
    pub endpoint: EndpointOpts,
    #[command(flatten)]
    pub tls: TlsOpts,
    #[command(flatten)]
    pub timeouts: TimeoutOpts,
}

/// What the poll loop does with a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Continue,
    Exit,
}

impl FailurePolicy {
    pub fn from_cli(s: &str) -> anyhow::Result<Self> {
        if s.eq_ignore_ascii_case("continue") {
            Ok(FailurePolicy::Continue)
        } else if s.eq_ignore_ascii_case("exit") {
            Ok(FailurePolicy::Exit)
        } else {
            Err(anyhow!("on-error must be 'continue' or 'exit'"))
        }
    }
}
