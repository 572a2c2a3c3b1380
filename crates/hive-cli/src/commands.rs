use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use hive_core::{
    export_tree, import_dir, ClientUsage, Hive, InstanceHistory, Manifest, TracingAuditSink,
};
use hive_gc::{FleetGc, FsSpaceProbe, GcReport, GcScheduler, HiveRegistry, LocalSweeper, SpaceGate};
use serde::Serialize;

use crate::cli::*;
use crate::config::{ConfigFileSchedule, HiveConfig};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Init(args) => cmd_init(args),
        Command::Put(args) => cmd_put(args),
        Command::Manifest(args) => cmd_manifest(args),
        Command::Tags(args) => cmd_tags(args, format),
        Command::Show(args) => cmd_show(args, format),
        Command::Export(args) => cmd_export(args),
        Command::Delete(args) => cmd_delete(args),
        Command::History(args) => cmd_history(args, format),
        Command::Usage(args) => cmd_usage(args, format),
        Command::Gc(args) => cmd_gc(args, &cli.config, format),
    }
}

fn open_hive(path: &Path) -> anyhow::Result<Hive> {
    let hive = Hive::open(path).with_context(|| format!("opening hive {}", path.display()))?;
    Ok(hive.with_audit_sink(Arc::new(TracingAuditSink)))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(args: InitArgs) -> anyhow::Result<()> {
    let existed = Hive::is_hive(&args.path);
    let hive = Hive::init(&args.path).with_context(|| format!("creating hive {}", args.path.display()))?;
    if existed {
        println!("Hive {} already exists in {}", hive.name().bold(), args.path.display());
    } else {
        println!("{} Initialized hive {} in {}", "✓".green().bold(), hive.name().bold(), args.path.display());
    }
    Ok(())
}

fn cmd_put(args: PutArgs) -> anyhow::Result<()> {
    let hive = open_hive(&args.hive)?;
    let data = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let id = hive.transaction(|tx| tx.put(&data))?;
    println!("{}", id.to_string().yellow());
    Ok(())
}

fn cmd_manifest(args: ManifestArgs) -> anyhow::Result<()> {
    let mut labels = Vec::new();
    for label in &args.labels {
        let Some((name, value)) = label.split_once('=') else {
            bail!("label {label:?} is not name=value");
        };
        labels.push((name.to_string(), value.to_string()));
    }

    let hive = open_hive(&args.hive)?;
    let (root, inserted) = hive
        .transaction(|tx| {
            let root = import_dir(tx, &args.dir)?;
            let mut manifest = Manifest::new(args.key.clone(), root);
            for (name, value) in &labels {
                manifest = manifest.with_label(name, value);
            }
            Ok((root, tx.insert_manifest(manifest)?))
        })
        .with_context(|| format!("publishing {}", args.key))?;

    if inserted {
        println!("{} {} → {}", "✓".green().bold(), args.key.to_string().bold(), root.short_hex().yellow());
    } else {
        println!("{} already published with identical content", args.key.to_string().bold());
    }
    Ok(())
}

fn cmd_tags(args: TagsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hive = open_hive(&args.hive)?;
    let items = match &args.name {
        Some(name) => hive.list_tags(name)?,
        None => hive.list_names()?,
    };
    if format == OutputFormat::Json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("Nothing published.");
    }
    for item in items {
        println!("{item}");
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hive = open_hive(&args.hive)?;
    let manifest = hive.resolve(&args.key)?;
    let tree = hive.read_tree(&manifest.root)?;
    if format == OutputFormat::Json {
        #[derive(Serialize)]
        struct Shown<'a> {
            manifest: &'a Manifest,
            entries: &'a [hive_store::TreeEntry],
        }
        return print_json(&Shown {
            manifest: &manifest,
            entries: tree.entries(),
        });
    }

    println!("Manifest {}", manifest.key.to_string().bold());
    println!("  Root: {}", manifest.root.to_string().yellow());
    for (name, value) in &manifest.labels {
        println!("  {}: {}", name.cyan(), value);
    }
    println!();
    for entry in tree.entries() {
        println!("  {:<12} {}  {}", entry.entry_type, entry.object_id.short_hex().dimmed(), entry.name);
    }
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let hive = open_hive(&args.hive)?;
    let manifest = hive.resolve(&args.key)?;
    export_tree(&hive, &manifest.root, &args.dest)
        .with_context(|| format!("exporting {} to {}", args.key, args.dest.display()))?;
    println!("{} Exported {} to {}", "✓".green().bold(), args.key.to_string().bold(), args.dest.display());
    Ok(())
}

fn cmd_delete(args: DeleteArgs) -> anyhow::Result<()> {
    let hive = open_hive(&args.hive)?;
    if hive.transaction(|tx| tx.delete_manifest(&args.key))? {
        println!("Deleted {}", args.key.to_string().bold());
    } else {
        println!("{} not found", args.key.to_string().bold());
    }
    Ok(())
}

fn cmd_history(args: HistoryArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hive = Arc::new(open_hive(&args.hive)?);
    let history = InstanceHistory::new(hive, &args.key)?;
    if let Some(action) = args.record {
        let record = history.record_event(action.into(), args.user, args.comment)?;
        println!("{} {}", "✓".green().bold(), record);
        return Ok(());
    }

    let records = history.full_history()?;
    if format == OutputFormat::Json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No history for {}", args.key.to_string().bold());
    }
    for record in records {
        println!("{record}");
    }
    Ok(())
}

fn cmd_usage(args: UsageArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hive = Arc::new(open_hive(&args.hive)?);
    let usage = ClientUsage::new(hive, &args.key)?;
    if let (Some(app), Some(host)) = (&args.app, &args.host) {
        usage.increment_today(app, host)?;
    }

    let data = usage.read()?;
    if format == OutputFormat::Json {
        return print_json(&data);
    }
    if data.is_empty() {
        println!("No usage recorded for {}", args.key.to_string().bold());
    }
    for (day, app, host, count) in data.entries() {
        println!("{day}  {:<20} {:<20} {}", app, host, count.to_string().bold());
    }
    Ok(())
}

fn cmd_gc(args: GcArgs, config_path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = HiveConfig::load_or_default(config_path)?;
    if config.storage_roots.is_empty() {
        bail!("no storage_roots configured in {}", config_path.display());
    }

    let mut registry = HiveRegistry::new();
    for root in &config.storage_roots {
        registry
            .scan_location(root)
            .with_context(|| format!("scanning {}", root.display()))?;
    }
    let hives = registry.hives().cloned().collect();
    let sweeper = LocalSweeper::new(config.node.clone(), hives, config.gc.grace())
        .with_space_gate(SpaceGate::new(Arc::new(FsSpaceProbe), config.gc.min_free_bytes()));
    let gc = FleetGc::new(Arc::new(registry), config.gc.node_timeout())
        .with_node(Arc::new(sweeper))
        .with_audit_sink(Arc::new(TracingAuditSink));
    let dry_run = args.dry_run || config.gc.dry_run;

    let runtime = tokio::runtime::Runtime::new()?;
    if args.watch {
        let scheduler = GcScheduler::new(
            Arc::new(gc),
            Arc::new(ConfigFileSchedule::new(config_path)),
            dry_run,
        );
        runtime.block_on(scheduler.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        }))?;
        return Ok(());
    }

    let report = runtime.block_on(gc.run(dry_run))?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    print_gc_report(&report);
    Ok(())
}

fn print_gc_report(report: &GcReport) {
    let verb = if report.dry_run || report.forced_dry_run { "would delete" } else { "deleted" };
    println!(
        "{} GC: {} hives, {} reachable objects, {} {} ({} bytes)",
        "✓".green().bold(),
        report.hives,
        report.reachable,
        verb,
        report.deleted().to_string().bold(),
        report.reclaimed_bytes()
    );
    if report.forced_dry_run {
        println!(
            "  {} {} reachable trees could not be read; nothing was deleted",
            "!".yellow().bold(),
            report.missing
        );
    }
    for node in &report.nodes {
        println!(
            "  {} scanned {}, {} {}, {} within grace period",
            node.node.bold(),
            node.scanned,
            verb,
            node.deleted,
            node.retained_recent
        );
        if node.cancelled {
            println!("    {} sweep stopped early", "!".yellow());
        }
        for hive in &node.skipped_hives {
            println!("    {} {} skipped: insufficient free space", "!".yellow(), hive);
        }
    }
    for skipped in &report.skipped {
        println!("  {} {} skipped: {}", "✗".red(), skipped.node.bold(), skipped.reason);
    }
}
