//! kubectl-mhc: A kubectl plugin for inspecting machine health checks
//!
//! This plugin provides convenient commands to interact with MachineHealthCheck resources:
//! - `kubectl mhc list` - List MachineHealthChecks with their selectors and rules
//! - `kubectl mhc targets <policy>` - Dry-run a policy and show each machine's verdict

use std::process;

use chrono::Utc;
use clap::{Parser, Subcommand};
use kube::Client;

use machine_health_k8s::controller::{inspect_policy, Store, TargetReport};
use machine_health_k8s::crd::{NamespacedName, Selector};
use machine_health_k8s::error::{Error, Result};
use machine_health_k8s::rest_api::dto::PolicySummary;

#[derive(Parser)]
#[command(name = "kubectl-mhc")]
#[command(about = "A kubectl plugin for inspecting machine health checks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, global = true, default_value = "table")]
    output: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List MachineHealthCheck resources
    List {
        /// Show all namespaces
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },
    /// Evaluate the machines a MachineHealthCheck selects, without remediating
    Targets {
        /// Name of the MachineHealthCheck
        policy: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = Client::try_default().await.map_err(Error::KubeError)?;
    let store = Store::kube(client);

    match cli.command {
        Commands::List { all_namespaces } => {
            let namespace = if all_namespaces {
                None
            } else {
                Some(cli.namespace.as_deref().unwrap_or("default"))
            };
            let policies = store
                .policies
                .list(namespace, &Selector::everything())
                .await?;
            let summaries: Vec<PolicySummary> = policies.iter().map(PolicySummary::from).collect();
            match cli.output.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
                "yaml" => println!("{}", serde_yaml::to_string(&summaries)?),
                _ => print!("{}", format_policies_table(&summaries, all_namespaces)),
            }
            Ok(())
        }
        Commands::Targets { policy } => {
            let namespace = cli.namespace.as_deref().unwrap_or("default");
            let key = NamespacedName::new(namespace, &policy);
            let mhc = store.policies.get(&key).await?.ok_or_else(|| Error::NotFound {
                kind: "MachineHealthCheck".to_string(),
                name: policy.clone(),
                namespace: namespace.to_string(),
            })?;
            let reports = inspect_policy(&store, &mhc, Utc::now()).await?;
            match cli.output.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&reports)?),
                "yaml" => println!("{}", serde_yaml::to_string(&reports)?),
                _ => print!("{}", format_targets_table(&reports)),
            }
            Ok(())
        }
    }
}

/// Render policies as a table
fn format_policies_table(policies: &[PolicySummary], show_namespace: bool) -> String {
    let mut out = String::new();
    if show_namespace {
        out.push_str(&format!(
            "{:<25} {:<30} {:<40} {:<6}\n",
            "NAMESPACE", "NAME", "SELECTOR", "RULES"
        ));
    } else {
        out.push_str(&format!("{:<30} {:<40} {:<6}\n", "NAME", "SELECTOR", "RULES"));
    }
    for policy in policies {
        let selector = if policy.selector.is_empty() {
            "<all>"
        } else {
            policy.selector.as_str()
        };
        if show_namespace {
            out.push_str(&format!(
                "{:<25} {:<30} {:<40} {:<6}\n",
                policy.namespace,
                policy.name,
                selector,
                policy.unhealthy_conditions.len()
            ));
        } else {
            out.push_str(&format!(
                "{:<30} {:<40} {:<6}\n",
                policy.name,
                selector,
                policy.unhealthy_conditions.len()
            ));
        }
    }
    out
}

/// Render dry-run verdicts as a table
fn format_targets_table(reports: &[TargetReport]) -> String {
    let mut out = format!(
        "{:<40} {:<30} {:<10} {:<10} {:<10}\n",
        "MACHINE", "NODE", "HEALTHY", "RECHECK", "ACTION"
    );
    for report in reports {
        let recheck = if report.recheck_after_secs == 0 {
            "-".to_string()
        } else {
            format!("{}s", report.recheck_after_secs)
        };
        out.push_str(&format!(
            "{:<40} {:<30} {:<10} {:<10} {:<10}\n",
            report.machine,
            report.node.as_deref().unwrap_or("<none>"),
            if report.unhealthy { "No" } else { "Yes" },
            recheck,
            report.planned_action.as_deref().unwrap_or("-")
        ));
    }
    out
}
