use clap::{Parser, Subcommand};
use flatshop_core::{
    config::{max_collection_bytes_from_env_value, session_ttl_from_env_value},
    constants::DEFAULT_DATA_DIR,
    digits_only,
    validation::validate_cpf,
    CoreConfig, DataService, LogNotifier,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flatshop")]
#[command(about = "Flatshop data store CLI")]
struct Cli {
    /// Directory holding the collections
    #[arg(long, env = "FLATSHOP_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing collections and shard oversized ones
    Init,
    /// List registered CPFs
    Users,
    /// List order ids
    Orders,
    /// Show one order
    Order {
        /// Order id (YYMMDD followed by the serial of the day)
        id: u64,
    },
    /// Show the address linked to a user
    Address {
        /// User CPF, formatted or digits only
        cpf: String,
    },
    /// Check whether a CPF is valid
    CheckCpf {
        /// CPF, formatted or digits only
        cpf: String,
    },
    /// Set the status of an order
    OrderStatus {
        /// Order id
        id: u64,
        /// New status (0 = placed)
        status: i64,
    },
}

fn build_service(data_dir: PathBuf) -> Result<DataService, Box<dyn std::error::Error>> {
    let max_collection_bytes =
        max_collection_bytes_from_env_value(std::env::var("FLATSHOP_MAX_COLLECTION_BYTES").ok())?;
    let session_ttl = session_ttl_from_env_value(std::env::var("FLATSHOP_SESSION_TTL_SECS").ok())?;
    let cfg = CoreConfig::new(data_dir, max_collection_bytes, session_ttl)?;
    Ok(DataService::new(Arc::new(cfg), Arc::new(LogNotifier)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'flatshop --help' for commands");
        return Ok(());
    };

    if let Commands::CheckCpf { cpf } = &command {
        let digits = digits_only(cpf);
        if validate_cpf(&digits) {
            println!("{digits} is a valid CPF");
        } else {
            println!("{digits} is not a valid CPF");
        }
        return Ok(());
    }

    let service = build_service(cli.data_dir)?;

    match command {
        Commands::Init => match service.init().await {
            Ok(()) => println!("Collections ready"),
            Err(e) => eprintln!("Error initialising collections: {}", e),
        },
        Commands::Users => match service.user_ids().await {
            Ok(cpfs) if cpfs.is_empty() => println!("No users found."),
            Ok(cpfs) => {
                for cpf in cpfs {
                    println!("{cpf}");
                }
            }
            Err(e) => eprintln!("Error listing users: {}", e),
        },
        Commands::Orders => match service.order_ids().await {
            Ok(ids) if ids.is_empty() => println!("No orders found."),
            Ok(ids) => {
                for id in ids {
                    println!("{id}");
                }
            }
            Err(e) => eprintln!("Error listing orders: {}", e),
        },
        Commands::Order { id } => match service.order(id).await {
            Ok(order) => println!("{}", serde_json::to_string_pretty(&order)?),
            Err(e) => eprintln!("Error reading order {}: {}", id, e),
        },
        Commands::Address { cpf } => {
            let cpf = digits_only(&cpf);
            match service.address_for(&cpf).await {
                Ok(address) => println!("{address}"),
                Err(e) => eprintln!("Error reading address for {}: {}", cpf, e),
            }
        }
        Commands::OrderStatus { id, status } => match service.set_order_status(id, status).await {
            Ok(order) => println!("Order {} now has status {}", order.id, order.status),
            Err(e) => eprintln!("Error updating order {}: {}", id, e),
        },
        Commands::CheckCpf { .. } => {}
    }

    Ok(())
}
