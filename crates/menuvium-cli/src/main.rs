use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use menuvium_core::presets::TagGroup;
use menuvium_core::{compute_facets, Menu, MenuQuery, SoldOutMode};
use menuvium_storage::{ClientPreferences, FilePrefs, InMemoryPrefs, PrefStore};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "menuvium")]
#[command(about = "Menu query tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Filter a catalog file and print the resulting view.
    View {
        catalog: PathBuf,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        sold_out: Option<SoldOutMode>,
        #[arg(long)]
        prefs: Option<PathBuf>,
    },
    /// Print the filter buckets for a catalog file.
    Facets {
        catalog: PathBuf,
        #[arg(long)]
        sold_out: Option<SoldOutMode>,
        #[arg(long)]
        prefs: Option<PathBuf>,
    },
    Prefs {
        #[arg(long)]
        dir: PathBuf,
        #[command(subcommand)]
        cmd: PrefsCmd,
    },
}

#[derive(Subcommand)]
enum PrefsCmd {
    Show,
    SetSoldOut { mode: SoldOutMode },
    SetLabel { bucket: String, label: String },
    /// Moves a tag to a bucket; `preset` restores the built-in grouping.
    SetGroup { identity_key: String, group: String },
}

fn read_catalog(path: &Path) -> Result<Menu> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse catalog {}", path.display()))
}

fn load_prefs(dir: Option<&Path>) -> Result<Box<dyn PrefStore>> {
    Ok(match dir {
        Some(dir) => Box::new(
            FilePrefs::open(dir).with_context(|| format!("open prefs {}", dir.display()))?,
        ),
        None => Box::new(InMemoryPrefs::new()),
    })
}

fn run(cmd: Cmd) -> Result<serde_json::Value> {
    match cmd {
        Cmd::View {
            catalog,
            search,
            tags,
            sold_out,
            prefs,
        } => {
            let menu = read_catalog(&catalog)?;
            let store = load_prefs(prefs.as_deref())?;
            let prefs = ClientPreferences::load(store.as_ref());
            let query = MenuQuery {
                search,
                tags,
                sold_out: sold_out.unwrap_or(prefs.sold_out_display),
            };
            Ok(serde_json::to_value(query.run(&menu, &prefs.tag_groups))?)
        }
        Cmd::Facets {
            catalog,
            sold_out,
            prefs,
        } => {
            let menu = read_catalog(&catalog)?;
            let store = load_prefs(prefs.as_deref())?;
            let prefs = ClientPreferences::load(store.as_ref());
            let mode = sold_out.unwrap_or(prefs.sold_out_display);
            Ok(serde_json::to_value(compute_facets(
                &menu,
                mode,
                &prefs.tag_groups,
            ))?)
        }
        Cmd::Prefs { dir, cmd } => {
            let store = FilePrefs::open(&dir)
                .with_context(|| format!("open prefs {}", dir.display()))?;
            match cmd {
                PrefsCmd::Show => {}
                PrefsCmd::SetSoldOut { mode } => {
                    ClientPreferences::save_sold_out_display(&store, mode)?;
                }
                PrefsCmd::SetLabel { bucket, label } => {
                    ClientPreferences::update_tag_labels(&store, |labels| {
                        labels.set(&bucket, label)
                    })?;
                }
                PrefsCmd::SetGroup {
                    identity_key,
                    group,
                } => {
                    let group = match group.as_str() {
                        "preset" => None,
                        other => Some(other.parse::<TagGroup>()?),
                    };
                    ClientPreferences::assign_tag_group(&store, &identity_key, group)?;
                }
            }
            Ok(serde_json::to_value(ClientPreferences::load(&store))?)
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter("warn")
        .init();
    let cli = Cli::parse();
    let out = run(cli.cmd)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
