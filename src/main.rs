/// Launchpad - application provisioning for Kubernetes
///
/// Thin command line front end over the launchpad library: provision, inspect
/// and tear down applications on the cluster the current credentials point at.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchpad::orchestrator::ResourceNames;
use launchpad::status::probe_endpoint;
use launchpad::{
    ApplicationSpec, CallContext, ClusterClient, DeploymentOrchestrator, LaunchpadConfig,
    StatusResolver, TeardownOptions,
};

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(about = "Provision applications on Kubernetes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path; built-in defaults are used when it does not exist
    #[arg(short, long, default_value = "launchpad.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration and application manifest
    Init {
        /// Where to write the example application manifest
        #[arg(long, default_value = "app.yaml")]
        app: PathBuf,
    },

    /// Check that the cluster API answers
    Health,

    /// Create every resource of an application
    Provision {
        /// Application manifest
        #[arg(long)]
        app: PathBuf,

        /// Wait for the workload to become ready
        #[arg(long)]
        wait: bool,
    },

    /// Delete an application's resources
    Teardown {
        namespace: String,
        app: String,

        /// Also delete the namespace
        #[arg(long)]
        delete_namespace: bool,
    },

    /// Show deployment status and URL of an application
    Status { namespace: String, app: String },

    /// Print the public URL of an application
    Url {
        namespace: String,
        app: String,

        /// Issue a GET against the URL
        #[arg(long)]
        probe: bool,
    },

    /// Change the replica count of an application
    Scale {
        namespace: String,
        app: String,
        replicas: u32,
    },

    /// Roll an application onto a new image
    SetImage {
        namespace: String,
        app: String,
        image: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("launchpad={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Ctrl-C cancels whatever is in flight; created resources are left alone
    let ctx = CallContext::new();
    let token = ctx.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });

    // Execute command
    let result = match &cli.command {
        Commands::Init { app } => init_config(&cli, app).await,
        Commands::Health => health(&cli).await,
        Commands::Provision { app, wait } => provision(&cli, app, *wait, &ctx).await,
        Commands::Teardown {
            namespace,
            app,
            delete_namespace,
        } => teardown(&cli, namespace, app, *delete_namespace, &ctx).await,
        Commands::Status { namespace, app } => status(&cli, namespace, app, &ctx).await,
        Commands::Url {
            namespace,
            app,
            probe,
        } => url(&cli, namespace, app, *probe, &ctx).await,
        Commands::Scale {
            namespace,
            app,
            replicas,
        } => scale(&cli, namespace, app, *replicas).await,
        Commands::SetImage {
            namespace,
            app,
            image,
        } => set_image(&cli, namespace, app, image).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<LaunchpadConfig> {
    LaunchpadConfig::from_file_or_default(&cli.config).context("Failed to load configuration")
}

async fn connect(config: &LaunchpadConfig) -> Result<ClusterClient> {
    let client = ClusterClient::connect(&config.cluster)
        .await
        .context("Failed to connect to the cluster")?;
    Ok(client)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize example configuration and application manifest
async fn init_config(cli: &Cli, app: &Path) -> Result<()> {
    for path in [cli.config.as_path(), app] {
        if path.exists() {
            anyhow::bail!("File already exists: {}", path.display());
        }
    }

    let config_yaml = serde_yaml::to_string(&LaunchpadConfig::example())?;
    tokio::fs::write(&cli.config, config_yaml)
        .await
        .context("Failed to write configuration file")?;

    let app_yaml = serde_yaml::to_string(&ApplicationSpec::example())?;
    tokio::fs::write(app, app_yaml)
        .await
        .context("Failed to write application manifest")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("Example application manifest created: {}", app.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit both files to match your cluster and application");
    info!("  2. Check the cluster is reachable:");
    info!("     launchpad health");
    info!("  3. Provision the application:");
    info!("     launchpad provision --app {} --wait", app.display());

    Ok(())
}

/// Check cluster reachability and list managed namespaces
async fn health(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let client = connect(&config).await?;

    client
        .health_check(config.cluster.health_check_timeout())
        .await?;
    info!("✓ Cluster API is reachable");

    let orchestrator = DeploymentOrchestrator::new(client, config.provisioning.clone());
    let managed: Vec<String> = orchestrator
        .namespaces()
        .list_managed()
        .await?
        .into_iter()
        .filter_map(|ns| ns.metadata.name)
        .collect();

    if cli.json {
        return print_json(&managed);
    }

    info!(
        "Namespaces managed by {}: {}",
        config.provisioning.managed_by,
        managed.len()
    );
    for name in managed {
        info!("  - {}", name);
    }
    Ok(())
}

/// Provision an application from its manifest
async fn provision(cli: &Cli, app: &Path, wait: bool, ctx: &CallContext) -> Result<()> {
    let config = load_config(cli)?;
    let spec = ApplicationSpec::from_file(app)
        .with_context(|| format!("Failed to load application manifest {}", app.display()))?;

    let client = connect(&config).await?;
    let orchestrator = DeploymentOrchestrator::new(client.clone(), config.provisioning.clone());

    let result = orchestrator.provision_application(&spec, ctx).await;
    if cli.json {
        print_json(&result)?;
    } else {
        for resource in &result.resources {
            info!("  {}", resource);
        }
    }

    if let Some(e) = result.error {
        return Err(e).context(format!("Provisioning of {} did not complete", result.application));
    }

    if wait {
        let names = ResourceNames::for_app(&result.application);
        let resolver = StatusResolver::new(client);
        let polling = config
            .readiness
            .polling(format!("Waiting for {} to become ready", names.deployment));

        let status = resolver
            .wait_for_ready(&result.namespace, &names.deployment, &polling, ctx)
            .await?;
        info!("{}/{} replicas ready", status.ready, status.declared);

        let url = resolver
            .ingress_url(&result.namespace, &names.ingress, ctx)
            .await?;
        info!("✓ {} is up at {}", result.application, url);
    } else {
        info!("✓ Application {} provisioned", result.application);
    }

    Ok(())
}

/// Delete an application's resources
async fn teardown(
    cli: &Cli,
    namespace: &str,
    app: &str,
    delete_namespace: bool,
    ctx: &CallContext,
) -> Result<()> {
    let config = load_config(cli)?;
    let client = connect(&config).await?;
    let orchestrator = DeploymentOrchestrator::new(client, config.provisioning.clone());

    let report = orchestrator
        .teardown_application(namespace, app, TeardownOptions { delete_namespace }, ctx)
        .await?;

    if cli.json {
        print_json(&report)?;
    } else {
        info!(
            "Deleted {} resources, {} already absent",
            report.deleted.len(),
            report.already_absent.len()
        );
    }

    if report.cancelled {
        anyhow::bail!("Teardown of {} was cancelled", report.application);
    }
    Ok(())
}

/// Show deployment status and URL
async fn status(cli: &Cli, namespace: &str, app: &str, ctx: &CallContext) -> Result<()> {
    let config = load_config(cli)?;
    let client = connect(&config).await?;

    let status = StatusResolver::new(client)
        .application_status(namespace, app, ctx)
        .await?;

    if cli.json {
        return print_json(&status);
    }

    let deployment = &status.deployment;
    info!("Application: {} ({})", status.application, status.namespace);
    info!(
        "  Replicas: {} declared, {} current, {} ready, {} available, {} updated",
        deployment.declared,
        deployment.current,
        deployment.ready,
        deployment.available,
        deployment.updated
    );
    info!("  Ready: {}", if status.ready { "yes" } else { "no" });
    info!("  URL: {}", status.url.as_deref().unwrap_or("N/A"));
    Ok(())
}

/// Print the public URL, optionally probing it
async fn url(cli: &Cli, namespace: &str, app: &str, probe: bool, ctx: &CallContext) -> Result<()> {
    let config = load_config(cli)?;
    let client = connect(&config).await?;
    let names = ResourceNames::for_app(app);

    let url = StatusResolver::new(client)
        .ingress_url(namespace, &names.ingress, ctx)
        .await?;

    if !probe {
        if cli.json {
            return print_json(&url);
        }
        info!("{}", url);
        return Ok(());
    }

    let timeout = Duration::from_secs(config.cluster.request_timeout_secs);
    let outcome = ctx.run(probe_endpoint(&url, timeout)).await?;

    if cli.json {
        return print_json(&outcome);
    }

    info!(
        "{} answered {} in {} ms",
        outcome.url, outcome.status, outcome.elapsed_ms
    );
    if !outcome.reachable {
        anyhow::bail!("{} is not serving successfully", outcome.url);
    }
    Ok(())
}

/// Change the replica count
async fn scale(cli: &Cli, namespace: &str, app: &str, replicas: u32) -> Result<()> {
    let config = load_config(cli)?;
    let client = connect(&config).await?;
    let orchestrator = DeploymentOrchestrator::new(client, config.provisioning.clone());
    let names = ResourceNames::for_app(app);

    orchestrator
        .workloads()
        .scale(namespace, &names.deployment, replicas)
        .await?;
    info!("✓ {} scaled to {} replicas", app, replicas);
    Ok(())
}

/// Roll onto a new image
async fn set_image(cli: &Cli, namespace: &str, app: &str, image: &str) -> Result<()> {
    let config = load_config(cli)?;
    let client = connect(&config).await?;
    let orchestrator = DeploymentOrchestrator::new(client, config.provisioning.clone());
    let names = ResourceNames::for_app(app);

    orchestrator
        .workloads()
        .set_image(namespace, &names.deployment, image)
        .await?;
    info!("✓ {} now runs {}", app, image);
    Ok(())
}
