use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::Value;

use sentinel_policy_center::{validate, SentinelPolicy};

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective policy
    Show {
        /// Also list the layer each setting was taken from
        #[arg(long)]
        sources: bool,
    },

    /// Validate the effective policy
    Validate,
}

pub fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.policy_path();
    match args.action {
        ConfigAction::Show { sources } => {
            println!("# Effective policy ({})", path.display());
            println!("{}", serde_yaml::to_string(ctx.policy())?);
            if sources {
                println!("# Sources");
                for setting in setting_paths(ctx.policy())? {
                    println!("{setting}: {}", ctx.policy().source_of(&setting).as_str());
                }
            }
        }
        ConfigAction::Validate => {
            validate(ctx.policy())?;
            println!("Policy is valid ({})", path.display());
        }
    }
    Ok(())
}

/// Dotted path of every leaf setting, provenance bookkeeping excluded.
fn setting_paths(policy: &SentinelPolicy) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    collect_paths(&serde_json::to_value(policy)?, String::new(), &mut paths);
    Ok(paths)
}

fn collect_paths(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if prefix.is_empty() && key == "provenance" {
                    continue;
                }
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_paths(child, path, out);
            }
        }
        _ if !prefix.is_empty() => out.push(prefix),
        _ => {}
    }
}
