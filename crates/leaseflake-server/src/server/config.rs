use anyhow::bail;
use clap::Parser;
use leaseflake::id::{MAX_DATACENTER_ID, MAX_WORKER_ID};

/// Runtime configuration for the `leaseflake-server` binary.
///
/// Values are parsed from CLI arguments or environment variables, with
/// defaults suitable for a single-node development deployment. `provider`
/// selects between the two worker-id provider modes: `simple` runs with a
/// fixed, operator-assigned `worker_id`; `consul` leases one from the
/// consensus KV store at `consul_address`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "leaseflake-server",
    version,
    about = "A gRPC service generating distributed, Snowflake-style ids"
)]
pub struct CliArgs {
    /// Bind address host component for the RPC listener.
    ///
    /// Environment variable: `HOST`
    ///
    /// Default: `"0.0.0.0"`
    #[arg(long, env = "HOST", default_value_t = String::from("0.0.0.0"))]
    pub host: String,

    /// RPC listen port.
    ///
    /// Environment variable: `RPC_PORT`
    ///
    /// Default: `50051`
    #[arg(long, env = "RPC_PORT", default_value_t = 50051)]
    pub rpc_port: u16,

    /// Metrics HTTP port exposing the Prometheus-format `/metrics` endpoint.
    /// Only used when built with the `metrics` feature.
    ///
    /// Environment variable: `METRICS_PORT`
    ///
    /// Default: `9090`
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Which worker-id provider to run: `simple` for a fixed,
    /// operator-assigned id (see `--worker-id`), or `consul` to lease one
    /// from the consensus KV store at `--consul-address`.
    ///
    /// Environment variable: `PROVIDER`
    ///
    /// Default: `"simple"`
    #[arg(long, env = "PROVIDER", default_value_t = String::from("simple"))]
    pub provider: String,

    /// Datacenter id embedded in every generated id's 2-bit datacenter
    /// field. Must be in `[0, 3]`.
    ///
    /// Environment variable: `DATACENTER_ID`
    ///
    /// Default: `0`
    #[arg(long, env = "DATACENTER_ID", default_value_t = 0)]
    pub datacenter_id: i64,

    /// A fixed, operator-assigned worker id, used when `--provider simple`.
    /// Must be in `[0, 255]`.
    ///
    /// Environment variable: `WORKER_ID`
    ///
    /// Default: `0`
    #[arg(long, env = "WORKER_ID", default_value_t = 0)]
    pub worker_id: i64,

    /// Starting point for the Leased Provider's scan; clamped to `[0, 255]`.
    ///
    /// Environment variable: `HINT_WORKER_ID`
    ///
    /// Default: `0`
    #[arg(long, env = "HINT_WORKER_ID", default_value_t = 0)]
    pub hint_worker_id: i64,

    /// Base URL of the consensus KV service used to lease a worker id when
    /// `--provider consul` is selected.
    ///
    /// Environment variable: `CONSUL_ADDRESS`
    ///
    /// Default: `"http://127.0.0.1:8500"`
    #[arg(long, env = "CONSUL_ADDRESS", default_value_t = String::from("http://127.0.0.1:8500"))]
    pub consul_address: String,

    /// KV key prefix under which candidate worker-id slots are stored.
    ///
    /// Environment variable: `CONSUL_KEY_PREFIX`
    ///
    /// Default: `"leaseflake/workers"`
    #[arg(long, env = "CONSUL_KEY_PREFIX", default_value_t = String::from("leaseflake/workers"))]
    pub consul_key_prefix: String,

    /// Session TTL, in seconds, for the consensus KV session backing a held
    /// lock.
    ///
    /// Environment variable: `CONSUL_SESSION_TTL`
    ///
    /// Default: `15`
    #[arg(long, env = "CONSUL_SESSION_TTL", default_value_t = 15)]
    pub consul_session_ttl_secs: u64,

    /// When leasing a worker id, continue serving the last-known id after
    /// the lease is lost instead of immediately refusing requests. Trades
    /// uniqueness guarantees for availability.
    ///
    /// Environment variable: `ENABLE_SELF_PRESERVATION`
    ///
    /// Default: `true`
    #[arg(long, env = "ENABLE_SELF_PRESERVATION", default_value_t = true)]
    pub enable_self_preservation: bool,

    /// Maximum time (in seconds) to wait for in-flight requests to complete
    /// during a graceful shutdown before the process exits anyway.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    ///
    /// Default: `15`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 15)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Simple,
    Consul,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub rpc_port: u16,
    pub metrics_port: u16,
    pub provider: ProviderKind,
    pub datacenter_id: i64,
    pub worker_id: i64,
    pub hint_worker_id: i64,
    pub consul_address: String,
    pub consul_key_prefix: String,
    pub consul_session_ttl_secs: u64,
    pub enable_self_preservation: bool,
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.rpc_port)
    }

    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if !(0..=MAX_DATACENTER_ID).contains(&args.datacenter_id) {
            bail!(
                "DATACENTER_ID ({}) must be in [0, {}]",
                args.datacenter_id,
                MAX_DATACENTER_ID
            );
        }

        let provider = match args.provider.as_str() {
            "simple" => ProviderKind::Simple,
            "consul" => ProviderKind::Consul,
            other => bail!("PROVIDER ({other}) must be \"simple\" or \"consul\""),
        };

        if !(0..=MAX_WORKER_ID).contains(&args.worker_id) {
            bail!(
                "WORKER_ID ({}) must be in [0, {}]",
                args.worker_id,
                MAX_WORKER_ID
            );
        }

        Ok(Self {
            host: args.host,
            rpc_port: args.rpc_port,
            metrics_port: args.metrics_port,
            provider,
            datacenter_id: args.datacenter_id,
            worker_id: args.worker_id,
            hint_worker_id: args.hint_worker_id,
            consul_address: args.consul_address,
            consul_key_prefix: args.consul_key_prefix,
            consul_session_ttl_secs: args.consul_session_ttl_secs,
            enable_self_preservation: args.enable_self_preservation,
            shutdown_timeout: args.shutdown_timeout,
        })
    }
}
