use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use terra_client::TerraClient;
use terra_core::prelude::*;
use terra_fs::FileSystemInstances;
use terra_server::{TerraServer, TerraServerConfig};
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "terra")]
#[command(about = "CLI for the Terra instance file server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL
    #[arg(short, long, env = "TERRA_URL", default_value = "http://localhost:3000")]
    url: String,
}

#[derive(Args)]
struct ManifestArgs {
    /// Hash algorithm (sha1 or sha256)
    #[arg(long = "hash", default_value_t = HashAlgorithm::Sha1)]
    algorithm: HashAlgorithm,

    /// Report file sizes
    #[arg(long)]
    include_size: bool,

    /// Report last modification times
    #[arg(long)]
    include_modified: bool,

    /// Leave symbolic links out instead of failing
    #[arg(long)]
    skip_symlinks: bool,
}

impl ManifestArgs {
    fn config(&self) -> ManifestConfig {
        ManifestConfig {
            algorithm: self.algorithm,
            include_size: self.include_size,
            include_modified: self.include_modified,
            symlinks: if self.skip_symlinks {
                SymlinkPolicy::Skip
            } else {
                SymlinkPolicy::Reject
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve every directory under the root as an instance
    Serve {
        /// The directory holding one subdirectory per instance
        #[arg(long, env = "TERRA_ROOT", default_value = "./instances")]
        root: PathBuf,

        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,

        /// Base URL used for download links (defaults to http://localhost:<port>/)
        #[arg(long, env = "TERRA_PUBLIC_URL")]
        public_url: Option<Url>,

        /// Give up on a manifest after this many seconds (0 disables the limit)
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Do not answer cross-origin requests
        #[arg(long)]
        no_cors: bool,

        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// Print the manifest of a local directory
    Manifest {
        dir: PathBuf,

        /// Instance name to report (defaults to the directory name)
        #[arg(long)]
        instance: Option<String>,

        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// List the instances on the server
    Instances,
    /// Fetch and display the manifest of an instance
    GetManifest { instance: String },
    /// Download missing or changed files of an instance into a directory
    Sync {
        instance: String,

        #[arg(short, long)]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            root,
            port,
            public_url,
            timeout_secs,
            no_cors,
            manifest,
        } => {
            let store = FileSystemInstances::new(root).with_manifest_config(manifest.config());
            store.ensure_root().await?;

            let public_url = match public_url {
                Some(url) => url,
                None => Url::parse(&format!("http://localhost:{port}/"))?,
            };
            let config = TerraServerConfig {
                public_url,
                manifest_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
                cors: !no_cors,
            };
            let app = TerraServer::new(config).build(store);

            let addr = format!("0.0.0.0:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Server listening on http://{addr}");
            axum::serve(listener, app).await?;
        }
        Commands::Manifest {
            dir,
            instance,
            manifest,
        } => {
            let instance = instance
                .or_else(|| {
                    dir.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| "local".to_string());
            let config = manifest.config();
            let manifest = tokio::task::spawn_blocking(move || {
                build_manifest(&instance, &dir, config)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Instances => {
            let client = TerraClient::new(&cli.url)?;
            for instance in client.list_instances().await? {
                println!("{instance}");
            }
        }
        Commands::GetManifest { instance } => {
            let client = TerraClient::new(&cli.url)?;
            println!("🔍 Fetching manifest for instance '{instance}'...");
            let manifest = client.fetch_manifest(&instance).await?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Sync { instance, dir } => {
            let client = TerraClient::new(&cli.url)?;
            println!("🚀 Syncing instance '{instance}' into {dir:?}...");

            let report = client.sync_instance(&instance, &dir).await?;
            for path in &report.downloaded {
                println!("Downloaded: {path}");
            }
            for path in &report.extra {
                println!("Not on server: {path}");
            }

            println!(
                "✅ {} files downloaded, {} already up to date.",
                report.downloaded.len(),
                report.up_to_date
            );
        }
    }

    Ok(())
}
