//! Standalone domain directory backed by the in-memory domain manager.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use vmctl_server::logging::init_logging;
use vmctl_server::manager::InMemoryDomainManager;
use vmctl_server::network::{NetworkConfig, NetworkModule, TlsConfig, DEFAULT_DIRECTORY_PATH};
use vmctl_server::service::{DomainDirectory, ServiceConfig, ServiceNode};

#[derive(Debug, Parser)]
#[command(name = "vmctl-test-server")]
#[command(about = "Domain directory HTTP server over an in-memory domain manager")]
struct Args {
    #[arg(long, env = "VMCTL_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "VMCTL_PORT", default_value = "8000")]
    port: u16,

    #[arg(long, env = "VMCTL_DIRECTORY_PATH", default_value = DEFAULT_DIRECTORY_PATH)]
    directory_path: String,

    #[arg(long, env = "VMCTL_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    #[arg(long, env = "VMCTL_REQUEST_TIMEOUT_SECS", default_value = "330")]
    request_timeout_secs: u64,

    #[arg(long, env = "VMCTL_MAX_BODY_BYTES", default_value = "4194304")]
    max_body_bytes: usize,

    #[arg(long, env = "VMCTL_RESTORE_WORKERS", default_value = "4")]
    restore_workers: u32,

    #[arg(long, env = "VMCTL_RESTORE_QUEUE", default_value = "64")]
    restore_queue_capacity: usize,

    /// 0 waits for restores without limit.
    #[arg(long, env = "VMCTL_RESTORE_TIMEOUT_SECS", default_value = "300")]
    restore_timeout_secs: u64,

    #[arg(long, env = "VMCTL_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "VMCTL_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    #[arg(long, env = "VMCTL_LOG_JSON", help = "Emit JSON log lines")]
    log_json: bool,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls: self
                .tls_cert
                .clone()
                .zip(self.tls_key.clone())
                .map(|(cert_path, key_path)| TlsConfig { cert_path, key_path }),
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_body_bytes: self.max_body_bytes,
            directory_path: self.directory_path.clone(),
        }
    }

    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            restore_workers: self.restore_workers,
            restore_queue_capacity: self.restore_queue_capacity,
            restore_timeout: (self.restore_timeout_secs > 0)
                .then(|| Duration::from_secs(self.restore_timeout_secs)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json)?;

    let network = args.network_config();
    let node_name = network
        .directory_route()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let manager = Arc::new(InMemoryDomainManager::new());
    let directory = Arc::new(DomainDirectory::new(
        ServiceNode::new(node_name),
        manager,
        &args.service_config(),
    ));

    let mut module = NetworkModule::new(network, directory);
    let port = module.start().await?;
    tracing::info!(port, directory = %args.directory_path, "domain directory listening");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "cannot listen for ctrl-c, shutting down");
            }
            tracing::info!("shutdown requested");
        })
        .await
}
