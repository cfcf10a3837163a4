use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use workscope_k8s::{ClusterGateway, KubeGateway, SnapshotCache};
use workscope_logs::{LogOptions, get_pod_logs};
use workscope_workloads::{WorkloadKind, WorkloadService};

mod config;

use config::Config;

/// Workscope - Kubernetes workloads as one controller and its pods
#[derive(Parser, Debug)]
#[command(name = "workscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kubernetes context name (defaults to the current context)
    #[arg(long, global = true)]
    context: Option<String>,

    /// Namespace (defaults to the context's namespace)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every workload in the namespace
    List {
        /// Only workloads whose pods or pod templates match this label selector
        #[arg(short = 'l', long)]
        selector: Option<String>,
    },

    /// List pods, or show one pod by name
    Pods {
        name: Option<String>,

        #[arg(short = 'l', long)]
        selector: Option<String>,
    },

    /// Print the app label of a workload
    AppName { name: String },

    /// Show one workload
    Get {
        name: String,

        /// Controller kind to look for, e.g. Deployment
        #[arg(long)]
        kind: Option<String>,

        /// Attach the services that select the workload
        #[arg(long)]
        services: bool,
    },

    /// Apply a JSON merge patch to a workload and show the result
    Patch {
        name: String,

        /// Merge patch document, e.g. '{"spec":{"replicas":2}}'
        patch: String,

        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        services: bool,
    },

    /// Read the logs of a pod
    Logs {
        pod: String,

        #[arg(short, long)]
        container: Option<String>,

        /// Length of the time window, e.g. 30s or 1h30m
        #[arg(long)]
        duration: Option<String>,

        /// Start of the window in Unix seconds
        #[arg(long)]
        since_time: Option<String>,

        /// Keep only the last N lines
        #[arg(long)]
        tail_lines: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;

    let kube = KubeGateway::connect(
        args.context.as_deref(),
        Some(config.cluster.request_timeout()),
    )
    .await?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| kube.default_namespace().to_string());
    let gateway: Arc<dyn ClusterGateway> = Arc::new(kube);

    let mut workloads = WorkloadService::new(gateway.clone(), config.workloads.clone());
    if config.cache.enabled {
        workloads =
            workloads.with_cache(Arc::new(SnapshotCache::new(gateway.clone(), config.cache.clone())));
    }

    match args.command {
        Command::List { selector } => {
            let listed = match selector {
                Some(selector) => {
                    workloads
                        .list_workloads_by_selector(&namespace, &selector)
                        .await
                }
                None => workloads.list_workloads(&namespace).await,
            }
            .with_context(|| format!("Failed to list workloads in namespace: {}", namespace))?;
            print_json(&listed)
        }
        Command::Pods { name, selector } => match name {
            Some(name) => {
                let pod = workloads
                    .get_pod(&namespace, &name)
                    .await
                    .with_context(|| format!("Failed to get pod: {}/{}", namespace, name))?;
                print_json(&pod)
            }
            None => {
                let pods = workloads
                    .list_pods(&namespace, selector.as_deref().unwrap_or_default())
                    .await
                    .with_context(|| format!("Failed to list pods in namespace: {}", namespace))?;
                print_json(&pods)
            }
        },
        Command::AppName { name } => {
            let app = workloads
                .get_workload_app_name(&namespace, &name)
                .await
                .with_context(|| format!("Failed to get workload: {}/{}", namespace, name))?;
            print_json(&app)
        }
        Command::Get {
            name,
            kind,
            services,
        } => {
            let kind = kind.map(WorkloadKind::from);
            let workload = workloads
                .get_workload(&namespace, &name, kind.as_ref(), services)
                .await
                .with_context(|| format!("Failed to get workload: {}/{}", namespace, name))?;
            print_json(&workload)
        }
        Command::Patch {
            name,
            patch,
            kind,
            services,
        } => {
            let kind = kind.map(WorkloadKind::from);
            let workload = workloads
                .update_workload(&namespace, &name, kind.as_ref(), services, &patch)
                .await
                .with_context(|| format!("Failed to patch workload: {}/{}", namespace, name))?;
            print_json(&workload)
        }
        Command::Logs {
            pod,
            container,
            duration,
            since_time,
            tail_lines,
        } => {
            let options = LogOptions::from_criteria(
                container.as_deref(),
                duration.as_deref(),
                since_time.as_deref(),
                tail_lines.as_deref(),
            )?;
            let entries = get_pod_logs(gateway.as_ref(), &namespace, &pod, &options)
                .await
                .with_context(|| format!("Failed to read logs of pod: {}/{}", namespace, pod))?;
            print_json(&entries)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", text);
    Ok(())
}
