use anyhow::Result;
use serde_json::json;
use std::io::{self, Write};
use versiondb::upgrade::{
    IncompatibleEvent, Observer, TaskEndEvent, TaskStartEvent, VersionEndEvent, VersionStartEvent,
};
use versiondb::{Inventory, Manifest, StoreConfig, StoreInit, UpgradeResult, UpgradeStatus};

/// Prints upgrade progress to the terminal. Silent in JSON mode so stdout
/// stays a single document.
pub struct ConsoleObserver {
    quiet: bool,
}

impl ConsoleObserver {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Observer for ConsoleObserver {
    fn incompatible(&self, event: &IncompatibleEvent<'_>) {
        if self.quiet {
            return;
        }
        eprintln!(
            " INCOMPATIBLE  {} is recorded at version {}, which the manifest does not declare",
            event.manifest.product(),
            event.recorded_version
        );
    }

    fn version_start(&self, event: &VersionStartEvent<'_>) {
        if !self.quiet {
            println!("{}@{}", event.manifest.product(), event.version.name());
        }
    }

    fn task_start(&self, event: &TaskStartEvent<'_>) {
        if !self.quiet {
            print!("  - {} ... ", event.task.name());
            let _ = io::stdout().flush();
        }
    }

    fn task_end(&self, event: &TaskEndEvent<'_>) {
        if self.quiet {
            return;
        }
        match event.result {
            Ok(_) => println!("ok"),
            Err(err) => {
                println!("failed");
                eprintln!();
                eprintln!(
                    " ERROR  running task {} from version {}",
                    event.task.name(),
                    event.version.name()
                );
                eprintln!();
                eprintln!("  {}", err);
                eprintln!();
            }
        }
    }

    fn version_end(&self, event: &VersionEndEvent<'_>) {
        if !self.quiet && event.result.is_ok() {
            println!();
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_validated(manifest: &Manifest, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(&json!({
            "product": manifest.product(),
            "valid": true,
            "versions": manifest.versions().len(),
        }));
    }
    println!(
        "👍 {} ({} versions)",
        manifest.product(),
        manifest.versions().len()
    );
    Ok(())
}

pub fn print_description(manifest: &Manifest, as_json: bool) -> Result<()> {
    if as_json {
        let versions: Vec<_> = manifest
            .versions()
            .iter()
            .map(|version| {
                let tasks: Vec<_> = version
                    .tasks()
                    .iter()
                    .map(|task| {
                        json!({
                            "name": task.name(),
                            "path": task.path().map(|p| p.display().to_string()),
                        })
                    })
                    .collect();
                json!({ "name": version.name(), "tasks": tasks })
            })
            .collect();
        return print_json(&json!({
            "product": manifest.product(),
            "versions": versions,
        }));
    }

    println!("Product: {}", manifest.product());
    for version in manifest.versions() {
        println!();
        println!("{}@{}", manifest.product(), version.name());
        for task in version.tasks() {
            println!("  - {}", task.name());
            if let Some(path) = task.path() {
                println!("    {}", path.display());
            }
        }
    }
    Ok(())
}

pub fn print_inventory(inventory: &Inventory, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(inventory);
    }

    let Some(products) = inventory.products.as_ref().filter(|p| !p.is_empty()) else {
        println!("No products recorded");
        return Ok(());
    };

    let width = products
        .keys()
        .map(|p| p.chars().count())
        .chain(std::iter::once("PRODUCT".len()))
        .max()
        .unwrap_or_default();

    println!("{:<width$}  VERSION", "PRODUCT", width = width);
    for (product, version) in products {
        println!("{:<width$}  {}", product, version, width = width);
    }
    Ok(())
}

pub fn print_init(config: &StoreConfig, init: &StoreInit, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(init);
    }

    if !init.schema_created && !init.table_created {
        println!("{} already initialized", config.qualified_table());
        return Ok(());
    }
    if init.schema_created {
        println!("Created schema {}", config.schema());
    }
    if init.table_created {
        println!("Created table {}", config.qualified_table());
    }
    Ok(())
}

pub fn print_upgrade(result: &UpgradeResult<'_>, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(&result.summary());
    }

    let product = result.manifest.product();
    match result.result {
        UpgradeStatus::Success => match result.current_version_name() {
            Some(current) if result.is_up_to_date() => {
                println!("👍  CURRENT  {} is already at {}", product, current)
            }
            Some(current) => println!("👍  UPDATED  {} is now at version {}", product, current),
            None => println!("{} declares no versions", product),
        },
        UpgradeStatus::Incompatible => {
            eprintln!(
                " INCOMPATIBLE  {} is at version {}, which is not in the manifest",
                product,
                result.initial_version.as_deref().unwrap_or("-")
            );
        }
        UpgradeStatus::Error => {
            let failed = result.failed_version.map(|v| v.name()).unwrap_or("-");
            match result.current_version_name() {
                Some(current) => eprintln!(
                    " FAILED  {} stopped at version {}; {} was rolled back",
                    product, current, failed
                ),
                None => eprintln!(" FAILED  {} version {} was rolled back", product, failed),
            }
            if let Some(error) = &result.error {
                eprintln!("  {}", error);
            }
        }
    }
    Ok(())
}
