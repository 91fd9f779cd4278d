use chrono::NaiveDate;
use clap::Parser;
use pantry_cache::config::Config;
use pantry_cache::factory;
use pantry_cache::types::InventoryItem;
use pantry_cache::types::ItemDraft;
use pantry_cache::types::ItemName;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Track what is in your pantry, fridge and freezer.
#[derive(Debug, Parser)]
#[command(name = "pantry")]
pub struct Cli {
    /// TOML config file; `PANTRY_*` environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: InventoryCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum InventoryCommand {
    /// List the items of an inventory.
    List {
        inventory: String,
        #[arg(long)]
        json: bool,
    },
    /// Add an item to an inventory.
    Add {
        inventory: String,
        /// Free-text item name.
        #[arg(long, conflicts_with = "food_id", required_unless_present = "food_id")]
        name: Option<String>,
        /// Catalog food id instead of a free-text name.
        #[arg(long)]
        food_id: Option<String>,
        /// Display label for a catalog food.
        #[arg(long, requires = "food_id")]
        label: Option<String>,
        #[arg(long)]
        quantity: Decimal,
        #[arg(long)]
        unit: Option<String>,
        /// Expiry date, YYYY-MM-DD.
        #[arg(long)]
        expires: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Record that some amount of an item was used up.
    Consume {
        inventory: String,
        item_id: String,
        amount: Decimal,
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!("using {:?} backend at {}", config.backend, config.api_url);
    let cache = factory::open_cache(&config)?;
    match cli.cmd {
        InventoryCommand::List { inventory, json } => {
            let items = cache.refresh(&inventory).await?;
            if json {
                println!("{}", serde_json::to_string(&items)?);
            } else if items.is_empty() {
                println!("{inventory} is empty");
            } else {
                for item in &items {
                    println!("{}", format_item(item));
                }
            }
        }
        InventoryCommand::Add {
            inventory,
            name,
            food_id,
            label,
            quantity,
            unit,
            expires,
            notes,
            json,
        } => {
            let name = match (name, food_id) {
                (Some(name), _) => ItemName::Custom(name),
                (None, Some(food_id)) => ItemName::Catalog { food_id, label },
                (None, None) => anyhow::bail!("either --name or --food-id is required"),
            };
            let draft = ItemDraft {
                name,
                quantity,
                unit,
                expiry_date: expires,
                notes,
            };
            let item = cache.add_item(&inventory, draft).await?;
            if json {
                println!("{}", serde_json::to_string(&item)?);
            } else {
                println!("added {}", format_item(&item));
            }
        }
        InventoryCommand::Consume {
            inventory,
            item_id,
            amount,
            json,
        } => {
            // The item must be cached before it can be decremented.
            cache.refresh(&inventory).await?;
            cache.log_consumption(&inventory, &item_id, amount).await?;
            let remaining = cache.item(&inventory, &item_id);
            match (remaining, json) {
                (Some(item), true) => println!("{}", serde_json::to_string(&item)?),
                (Some(item), false) => println!("left {}", format_item(&item)),
                (None, true) => println!("null"),
                (None, false) => println!("{item_id} used up"),
            }
        }
    }
    Ok(())
}

fn format_item(item: &InventoryItem) -> String {
    let quantity = match &item.unit {
        Some(unit) => format!("{} {unit}", item.quantity.normalize()),
        None => item.quantity.normalize().to_string(),
    };
    let expires = item
        .expiry_date
        .map(|d| format!("\texpires {d}"))
        .unwrap_or_default();
    format!("{}\t{}\t{quantity}{expires}", item.id, item.name.display())
}
