use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;

use ordseq_numbering::{Allocation, NumberingConfig, OrderNumbering, Resolution};
use ordseq_store::{RecordStore, SqliteConfig, SqliteRecordStore, StatusFilter};
use ordseq_types::{NewRecord, OrderRecord, RecordKey};

use crate::cli::*;

/// Contents of the `--config` file: numbering keys at the top level, store
/// settings under `[sqlite]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub numbering: NumberingConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self =
            toml::from_str(&source).with_context(|| format!("parsing {}", path.display()))?;
        settings.numbering.validate()?;
        Ok(settings)
    }
}

type Numbering = OrderNumbering<SqliteRecordStore>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    if let Command::Config(_) = cli.command {
        return cmd_config(&settings);
    }

    let store = SqliteRecordStore::open(&cli.db, &settings.sqlite)
        .with_context(|| format!("opening {}", cli.db.display()))?;
    let numbering = OrderNumbering::new(Arc::new(store), settings.numbering.clone())?;
    let out = Output(cli.format);

    match cli.command {
        Command::Install(_) => cmd_install(&numbering, &out),
        Command::Create(args) => cmd_create(&numbering, &out, args),
        Command::Finalize(args) => cmd_finalize(&numbering, &out, args),
        Command::Assign(args) => cmd_assign(&numbering, &out, args),
        Command::Resolve(args) => cmd_resolve(&numbering, &out, args),
        Command::Show(args) => cmd_show(&numbering, &out, args),
        Command::List(args) => cmd_list(&numbering, &out, args),
        Command::Renew(args) => cmd_renew(&numbering, &out, args),
        Command::Config(_) => cmd_config(&settings),
    }
}

struct Output(OutputFormat);

impl Output {
    fn json(&self) -> bool {
        matches!(self.0, OutputFormat::Json)
    }

    fn emit(&self, value: serde_json::Value) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }
}

fn cmd_install(n: &Numbering, out: &Output) -> anyhow::Result<()> {
    let report = n.on_activation()?;
    if out.json() {
        return out.emit(serde_json::to_value(&report)?);
    }
    println!("{} Numbering installed", "✓".green().bold());
    println!("  Backfilled: {}", report.backfilled.to_string().bold());
    println!("  Already numbered: {}", report.already_numbered);
    let previous = report.previous_version.as_deref().unwrap_or("none");
    if report.version_written {
        println!("  Version: {} → {}", previous.dimmed(), n.config().version.yellow());
    } else {
        println!("  Version: {} (unchanged)", previous.yellow());
    }
    Ok(())
}

fn cmd_create(n: &Numbering, out: &Output, args: CreateArgs) -> anyhow::Result<()> {
    let mut new = NewRecord::new(args.status);
    if let Some(key) = args.key {
        new = new.with_key(RecordKey::new(key));
    }
    let record = n.store().insert_record(new)?;
    let allocation = n.on_order_saved(&record);
    print_allocation(n, out, &record, &allocation)
}

fn cmd_finalize(n: &Numbering, out: &Output, args: FinalizeArgs) -> anyhow::Result<()> {
    if args.status.is_draft() {
        bail!("cannot finalize an order into {}", args.status);
    }
    let record = n.store().update_status(RecordKey::new(args.key), args.status)?;
    let allocation = n.on_order_saved(&record);
    print_allocation(n, out, &record, &allocation)
}

fn cmd_assign(n: &Numbering, out: &Output, args: KeyArgs) -> anyhow::Result<()> {
    let key = RecordKey::new(args.key);
    let record = n
        .store()
        .record(key)?
        .with_context(|| format!("no order with key {key}"))?;
    let allocation = n.allocator().assign_record(&record);
    print_allocation(n, out, &record, &allocation)
}

fn cmd_resolve(n: &Numbering, out: &Output, args: ResolveArgs) -> anyhow::Result<()> {
    let resolution = n.resolve(&args.identifier)?;
    if out.json() {
        return out.emit(json!({
            "identifier": args.identifier,
            "resolution": resolution,
        }));
    }
    match resolution {
        Resolution::BySequentialNumber(key) => {
            println!("{} → order {}", args.identifier.bold(), key.to_string().yellow());
        }
        Resolution::ByRecordKey(key) => {
            println!(
                "{} → order {} {}",
                args.identifier.bold(),
                key.to_string().yellow(),
                "(un-numbered, matched by key)".dimmed()
            );
        }
        Resolution::NotFound => {
            println!("{} {}", args.identifier.bold(), "not found".red());
        }
    }
    Ok(())
}

fn cmd_show(n: &Numbering, out: &Output, args: KeyArgs) -> anyhow::Result<()> {
    let key = RecordKey::new(args.key);
    let record = n
        .store()
        .record(key)?
        .with_context(|| format!("no order with key {key}"))?;
    let properties = n.store().properties(key)?;
    let display = n.display_number(&record, &key.to_string())?;

    if out.json() {
        return out.emit(json!({
            "order": record,
            "display": display,
            "properties": properties,
        }));
    }
    println!("Order {}  {}", display.yellow().bold(), format!("key {key}").dimmed());
    println!("  Status: {}", record.status.to_string().cyan());
    println!("  Created: {}", record.created_at.to_rfc3339());
    for (name, value) in &properties {
        println!("  {}: {}", name.dimmed(), value);
    }
    Ok(())
}

fn cmd_list(n: &Numbering, out: &Output, args: ListArgs) -> anyhow::Result<()> {
    let filter = match args.status {
        Some(status) => StatusFilter::In(vec![status]),
        None => StatusFilter::Any,
    };
    let records = n.store().records(&filter)?;

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let display = n.display_number(&record, &record.key.to_string())?;
        rows.push((record, display));
    }

    if out.json() {
        let items: Vec<_> = rows
            .iter()
            .map(|(record, display)| json!({ "order": record, "display": display }))
            .collect();
        return out.emit(serde_json::Value::Array(items));
    }
    if rows.is_empty() {
        println!("No orders.");
    }
    for (record, display) in &rows {
        println!(
            "{:>10}  {:>8}  {}",
            display.yellow(),
            record.key.to_string().dimmed(),
            record.status.to_string().cyan()
        );
    }
    Ok(())
}

fn cmd_renew(n: &Numbering, out: &Output, args: RenewArgs) -> anyhow::Result<()> {
    let (renewal, allocation) = n.create_renewal(RecordKey::new(args.key), args.status)?;
    print_allocation(n, out, &renewal, &allocation)
}

fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    print!("{}", toml::to_string(settings)?);
    Ok(())
}

fn print_allocation(
    n: &Numbering,
    out: &Output,
    record: &OrderRecord,
    allocation: &Allocation,
) -> anyhow::Result<()> {
    let display = n.formatter().format(allocation.number(), &record.key.to_string());
    if out.json() {
        return out.emit(json!({
            "order": record,
            "display": display,
            "allocation": allocation_label(allocation),
        }));
    }
    let key = record.key.to_string();
    match allocation {
        Allocation::Assigned(_) => {
            println!(
                "{} Order {} numbered {}",
                "✓".green().bold(),
                key.dimmed(),
                display.yellow().bold()
            );
        }
        Allocation::AlreadyAssigned(_) => {
            println!("Order {} already numbered {}", key.dimmed(), display.yellow());
        }
        Allocation::SkippedDraft => {
            println!("Order {} is a {}; not numbered yet", key.yellow(), "draft".cyan());
        }
        Allocation::MissingRecord => {
            println!("{} No order with key {}", "✗".red().bold(), key);
        }
        Allocation::Abandoned { attempts, reason } => {
            println!(
                "{} Order {} left un-numbered after {} attempts: {}",
                "!".yellow().bold(),
                key.yellow(),
                attempts,
                reason.dimmed()
            );
        }
    }
    Ok(())
}

fn allocation_label(allocation: &Allocation) -> &'static str {
    match allocation {
        Allocation::Assigned(_) => "assigned",
        Allocation::AlreadyAssigned(_) => "already_assigned",
        Allocation::SkippedDraft => "skipped_draft",
        Allocation::MissingRecord => "missing_record",
        Allocation::Abandoned { .. } => "abandoned",
    }
}
