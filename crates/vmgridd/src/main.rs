//! vmgridd: the VmGrid operator binary.
//!
//! Drives the orchestrator against a local redb catalog. Remote commands go
//! through the dry-run transport, which logs every (directive, command)
//! pair it would send; floating-IP and volume calls are acknowledged and
//! logged the same way.
//!
//! # Usage
//!
//! ```text
//! vmgridd --config /etc/vmgrid/vmgrid.toml seed fleet.toml
//! vmgridd create --hostname web --count 2 --image 1 --flavor 1 --subnet 1
//! vmgridd report 3 running --host 2
//! vmgridd list --order -created_at
//! vmgridd action 3 shutdown
//! vmgridd delete 3
//! vmgridd config
//! ```

mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use vmgrid_core::{RequestContext, VmgridConfig};
use vmgrid_dispatch::RecordingExec;
use vmgrid_orchestrator::{
    CreateRequest, DryRunFloatingIps, DryRunVolumes, InstanceAction, ListQuery, Orchestrator,
    ProvisionError,
};
use vmgrid_state::{HostId, InstanceStatus, StateStore};

use crate::seed::Fixtures;

#[derive(Parser)]
#[command(name = "vmgridd", about = "VmGrid provisioning engine", version)]
struct Cli {
    /// Configuration file; a missing file means defaults.
    #[arg(long, global = true, default_value = "/etc/vmgrid/vmgrid.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// User id stamped as creator.
    #[arg(long, global = true, default_value = "1")]
    user: u64,

    /// Organization id stamped as owner and used for list visibility.
    #[arg(long, global = true, default_value = "1")]
    org: u64,

    /// See every organization's instances.
    #[arg(long, global = true)]
    admin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load flavors, images, subnets, hypervisors, keys, security groups
    /// and clusters from a TOML fixtures file.
    Seed {
        fixtures: PathBuf,
    },
    /// Provision one or more instances.
    Create {
        /// Hostname, or prefix when --count > 1.
        #[arg(long)]
        hostname: String,
        #[arg(long, default_value = "1")]
        count: u32,
        /// Omit only for cluster workers.
        #[arg(long)]
        image: Option<u64>,
        #[arg(long)]
        flavor: u64,
        /// Primary subnet.
        #[arg(long)]
        subnet: u64,
        /// Pinned primary address.
        #[arg(long)]
        address: Option<String>,
        /// Pinned primary MAC.
        #[arg(long)]
        mac: Option<String>,
        /// Secondary subnet; repeat for more.
        #[arg(long = "secondary")]
        secondaries: Vec<u64>,
        #[arg(long = "key")]
        keys: Vec<u64>,
        #[arg(long = "secgroup")]
        secgroups: Vec<u64>,
        #[arg(long)]
        zone: Option<u64>,
        #[arg(long)]
        cluster: Option<u64>,
        /// Role advertised to cluster workers.
        #[arg(long, default_value = "")]
        service: String,
        /// Pin the whole batch to this hypervisor.
        #[arg(long)]
        host: Option<u32>,
        /// File whose contents become the instance userdata.
        #[arg(long)]
        userdata: Option<PathBuf>,
    },
    /// List visible instances as JSON.
    List {
        #[arg(long, default_value = "0")]
        offset: u64,
        /// 0 uses the configured page size.
        #[arg(long, default_value = "0")]
        limit: u64,
        /// Column, optionally prefixed with - (descending) or + (ascending).
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        order: String,
        /// Hostname substring.
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Send a lifecycle action (start, shutdown, destroy, suspend, resume).
    Action {
        id: u64,
        action: String,
    },
    /// Record a status reported by the hypervisor agent; `--host` places
    /// the instance, omitting it unassigns it.
    Report {
        id: u64,
        /// pending, running, shut_off, suspended, migrating or error.
        status: InstanceStatus,
        #[arg(long)]
        host: Option<HostId>,
    },
    /// Delete an instance and release everything attached to it.
    Delete {
        id: u64,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = VmgridConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if matches!(cli.command, Command::Config) {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }
    if let Some(dir) = config.catalog.path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let state = StateStore::open(&config.catalog.path)?;
    info!(path = ?config.catalog.path, "catalog opened");

    let ctx = request_context(&cli);

    match cli.command {
        Command::Seed { fixtures } => {
            let fixtures = Fixtures::from_file(&fixtures)?;
            fixtures.apply(&state)?;
            println!("seeded {} records", fixtures.record_count());
            Ok(())
        }
        command => {
            let orchestrator = Orchestrator::new(
                state,
                Arc::new(RecordingExec::new()),
                Arc::new(DryRunFloatingIps),
                Arc::new(DryRunVolumes),
                &config,
            );
            let result = run(&orchestrator, &ctx, command).await;
            if let Err(err) = &result {
                warn!(class = %err.class(), error = %err, "operation failed");
            }
            Ok(result?)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vmgridd=debug,vmgrid=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Identity from the command line; Ctrl-C cancels in-flight dispatches.
fn request_context(cli: &Cli) -> RequestContext {
    let ctx = if cli.admin {
        RequestContext::admin(cli.user, cli.org)
    } else {
        RequestContext::new(cli.user, cli.org)
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });
    ctx.with_cancel(cancel_rx)
}

async fn run(
    orchestrator: &Orchestrator,
    ctx: &RequestContext,
    command: Command,
) -> Result<(), ProvisionError> {
    match command {
        Command::Seed { .. } | Command::Config => Ok(()),
        Command::Create {
            hostname,
            count,
            image,
            flavor,
            subnet,
            address,
            mac,
            secondaries,
            keys,
            secgroups,
            zone,
            cluster,
            service,
            host,
            userdata,
        } => {
            let userdata = match userdata {
                Some(path) => std::fs::read_to_string(&path).map_err(|err| {
                    ProvisionError::InvalidRequest(format!(
                        "cannot read userdata {}: {err}",
                        path.display()
                    ))
                })?,
                None => String::new(),
            };
            let req = CreateRequest {
                count,
                hostname,
                userdata,
                image,
                flavor,
                primary_subnet: subnet,
                primary_address: address,
                primary_mac: mac,
                secondary_subnets: secondaries,
                keys,
                secgroups,
                zone,
                cluster,
                service,
                hyper: host,
            };
            let created = orchestrator.create(ctx, &req).await?;
            print_json(&created);
            Ok(())
        }
        Command::List {
            offset,
            limit,
            order,
            query,
        } => {
            let page = orchestrator.list(
                ctx,
                &ListQuery {
                    offset,
                    limit,
                    order,
                    query,
                },
            )?;
            print_json(&page);
            Ok(())
        }
        Command::Action { id, action } => {
            let action: InstanceAction = action.parse()?;
            let instance = orchestrator.change_instance_status(ctx, id, action).await?;
            println!("{action} sent to instance {}", instance.id);
            Ok(())
        }
        Command::Report { id, status, host } => {
            let instance = orchestrator.apply_agent_report(id, status, host)?;
            print_json(&instance);
            Ok(())
        }
        Command::Delete { id } => {
            orchestrator.delete(ctx, id).await?;
            println!("instance {id} deleted");
            Ok(())
        }
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(error = %err, "cannot render output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmgrid_orchestrator::ErrorClass;
    use vmgrid_state::{CatalogRead, Instance};

    fn command(args: &[&str]) -> Command {
        let argv = std::iter::once("vmgridd").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command
    }

    fn pending(id: u64) -> Instance {
        Instance {
            id,
            hostname: "web".to_string(),
            image_id: Some(1),
            flavor_id: 1,
            cluster_id: None,
            zone_id: 1,
            hyper: None,
            status: InstanceStatus::Pending,
            userdata: String::new(),
            creator: 1,
            owner: 1,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn report_places_an_instance_for_later_actions() {
        let state = StateStore::open_in_memory().unwrap();
        state.put(&pending(3)).unwrap();
        let exec = RecordingExec::new();
        let orchestrator = Orchestrator::new(
            state.clone(),
            Arc::new(exec.clone()),
            Arc::new(DryRunFloatingIps),
            Arc::new(DryRunVolumes),
            &VmgridConfig::default(),
        );
        let ctx = RequestContext::new(1, 1);

        let err = run(&orchestrator, &ctx, command(&["action", "3", "start"]))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        run(
            &orchestrator,
            &ctx,
            command(&["report", "3", "shut_off", "--host", "2"]),
        )
        .await
        .unwrap();
        let instance = state.require::<Instance>(3).unwrap();
        assert_eq!(instance.status, InstanceStatus::ShutOff);
        assert_eq!(instance.hyper, Some(2));

        run(&orchestrator, &ctx, command(&["action", "3", "start"]))
            .await
            .unwrap();
        let calls = exec.calls_to("action_vm.sh");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].control, "inter=2");
    }

    #[test]
    fn report_rejects_unknown_statuses() {
        let err = Cli::try_parse_from(["vmgridd", "report", "3", "paused"]).err();
        assert!(err.is_some());
        assert!(matches!(command(&["config"]), Command::Config));
    }
}
