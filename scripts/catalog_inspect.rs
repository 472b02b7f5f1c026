use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sitecatalog::{
    logging, tree, CatalogSettings, CatalogSnapshot, CategoryPathResolver, CategoryService,
    Paging, StaticSiteContext, StaticWorkContext,
};

#[derive(Parser)]
#[command(name = "catalog-inspect", about = "Inspect and repair a catalog snapshot")]
struct Cli {
    /// Catalog snapshot (JSON)
    #[arg(long, value_name = "PATH")]
    snapshot: PathBuf,

    /// Optional settings file (JSON)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Role the reads are evaluated for; repeat for several
    #[arg(long = "role", value_name = "ID")]
    roles: Vec<i64>,

    /// Site the reads are evaluated for
    #[arg(long, value_name = "ID", default_value_t = 0)]
    site: i64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print categories in tree order
    Tree {
        /// Include unpublished and restricted categories
        #[arg(long)]
        show_hidden: bool,
        /// Emit JSON instead of an indented listing
        #[arg(long)]
        json: bool,
    },
    /// Print the category path of a product
    Path {
        #[arg(long, value_name = "ID")]
        product: i64,
        #[arg(long, value_name = "ID")]
        language: Option<i64>,
    },
    /// Report orphaned and cyclic categories (exit code 2 when any exist)
    Check,
    /// Delete a category and cascade to its subtree, saving the snapshot
    Delete {
        #[arg(long, value_name = "ID")]
        category: i64,
        /// Delete the subtree instead of moving it to the root
        #[arg(long)]
        children: bool,
    },
    /// Move a category under a new parent, saving the snapshot
    Reparent {
        #[arg(long, value_name = "ID")]
        category: i64,
        #[arg(long, value_name = "ID")]
        parent: i64,
    },
}

fn open_service(cli: &Cli) -> Result<CategoryService> {
    let settings = CatalogSettings::load(cli.settings.as_deref())?;
    let snapshot = CatalogSnapshot::load(&cli.snapshot)
        .with_context(|| format!("load snapshot {}", cli.snapshot.display()))?;
    Ok(CategoryService::builder(snapshot.into_stores()?)
        .work_context(Arc::new(StaticWorkContext::new(cli.roles.clone())))
        .site_context(Arc::new(StaticSiteContext::new(cli.site)))
        .settings(settings)
        .build())
}

fn save(service: &CategoryService, path: &Path) -> Result<()> {
    CatalogSnapshot::capture(service.stores())?
        .save(path)
        .with_context(|| format!("save snapshot {}", path.display()))
}

fn run(cli: Cli) -> Result<ExitCode> {
    let service = open_service(&cli)?;

    match cli.cmd {
        Cmd::Tree { show_hidden, json } => {
            let sorted = service
                .get_all_categories("", show_hidden, Paging::all())?
                .items;
            if json {
                println!("{}", serde_json::to_string_pretty(&sorted)?);
            } else {
                for (depth, category) in tree::with_depth(&sorted) {
                    println!("{}{} (#{})", "  ".repeat(depth), category.name, category.id);
                }
            }
        }
        Cmd::Path { product, language } => {
            let path = CategoryPathResolver::new(&service).resolve(product, language)?;
            println!("{path}");
        }
        Cmd::Check => {
            let categories: Vec<_> = service
                .stores()
                .categories
                .all()?
                .into_iter()
                .filter(|category| !category.deleted)
                .collect();
            let report = tree::diagnose(&categories);
            if report.is_clean() {
                println!("ok: {} categories, no orphans or cycles", categories.len());
            } else {
                println!("orphans: {:?}", report.orphans);
                println!("cyclic: {:?}", report.cyclic);
                return Ok(ExitCode::from(2));
            }
        }
        Cmd::Delete { category, children } => {
            let record = service
                .get_category_by_id(category)?
                .ok_or_else(|| anyhow!("category {category} not found"))?;
            let report = service.delete_category(record, children)?;
            save(&service, &cli.snapshot)?;
            println!(
                "deleted {category}; run {}: {} deleted, {} moved to root",
                report.run_id,
                report.deleted.len(),
                report.reparented.len()
            );
        }
        Cmd::Reparent { category, parent } => {
            let mut record = service
                .get_category_by_id(category)?
                .ok_or_else(|| anyhow!("category {category} not found"))?;
            record.parent_category_id = parent;
            let outcome = service.update_category(record)?;
            save(&service, &cli.snapshot)?;
            if outcome.parent_reset {
                println!(
                    "parent {} would create a cycle; category {category} moved to root",
                    outcome.requested_parent_id
                );
            } else {
                println!("category {category} now under {parent}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    logging::init();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
