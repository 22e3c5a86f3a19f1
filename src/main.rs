use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ldap_ou_filter::OuFilter;
use ldap_ou_filter::config::Configuration;
use ldap_ou_filter::error::Result;
use ldap_ou_filter::filter::ResultSet;
use ldap_ou_filter::telemetry;
use tokio::io::AsyncReadExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration.
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Print the DN and OU of users.
    Lookup {
        #[clap(required = true)]
        identifiers: Vec<String>,
    },
    /// Tell whether two users share an OU.
    Compare { first: String, second: String },
    /// Filter a JSON result set for a user and print it.
    Filter {
        /// User performing the search.
        #[clap(long, short)]
        user: String,
        /// Result set file, stdin when omitted.
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Configuration::default()
        .path(args.config.unwrap_or_default())
        .read();
    telemetry::init_tracing(&config.log_level);
    telemetry::describe_metrics();

    let ou_filter = OuFilter::new(config)?;

    match args.cmd {
        Commands::Lookup { identifiers } => {
            for identifier in identifiers {
                match ou_filter.resolver().resolve(&identifier).await {
                    Some(dn) => {
                        let ou = ou_filter.extractor().extract(&dn);
                        println!("{identifier}\tdn: {dn}");
                        println!(
                            "{identifier}\tou: {}",
                            if ou.is_empty() { "<none>" } else { ou.as_str() }
                        );
                    },
                    None => println!("{identifier}\tDN not found"),
                }
            }
        },
        Commands::Compare { first, second } => {
            let service = ou_filter.service();
            let same = service.same_ou(&first, &second).await;
            println!(
                "{first} ({}) and {second} ({}): {}",
                describe(service.get_ou(&first).await),
                describe(service.get_ou(&second).await),
                if same { "same OU" } else { "different OU" }
            );
        },
        Commands::Filter { user, file } => {
            let raw = match file {
                Some(path) => tokio::fs::read_to_string(path).await?,
                None => {
                    let mut raw = String::new();
                    tokio::io::stdin().read_to_string(&mut raw).await?;
                    raw
                },
            };

            let mut results: ResultSet = serde_json::from_str(&raw)?;
            ou_filter
                .result_filter()
                .filter_results(&mut results, &user)
                .await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        },
    }

    Ok(())
}

fn describe(ou: Option<String>) -> String {
    match ou {
        None => "DN not found".into(),
        Some(ou) if ou.is_empty() => "no OU".into(),
        Some(ou) => ou,
    }
}
