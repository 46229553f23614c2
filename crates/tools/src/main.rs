use std::path::PathBuf;

use catalog::AssetClass;
use clap::{Args, Parser, Subcommand, ValueEnum};
use scene::FilterPredicate;
use serde::Serialize;
use tools::{
    FileFetcher, ToolError, anchor_report, facet_report, feature_geojson, feature_summary,
    inspect_model, load_snapshot, load_storage, resolve_url,
};

#[derive(Parser, Debug)]
#[command(name = "geoviz", about = "Inspect site snapshots, asset paths and 3D models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count (or export) the map features a filter would produce.
    Features(FeaturesArgs),
    /// List filter facet values among active sites.
    Facets { snapshot: PathBuf },
    /// Turn a stored asset path into a public URL.
    Resolve(ResolveArgs),
    /// Load and summarise a glTF / GLB file.
    InspectModel {
        path: PathBuf,
    },
    /// Print the placement transform for a model anchor.
    Anchor(AnchorArgs),
}

#[derive(Args, Debug)]
struct FeaturesArgs {
    snapshot: PathBuf,
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long, default_value = "")]
    category: String,
    #[arg(long, default_value = "")]
    province: String,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long, default_value = "")]
    client: String,
    /// Print the GeoJSON handed to the map instead of a summary.
    #[arg(long)]
    geojson: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ClassArg {
    SiteImage,
    Overlay,
    Model,
}

impl From<ClassArg> for AssetClass {
    fn from(c: ClassArg) -> Self {
        match c {
            ClassArg::SiteImage => AssetClass::SiteImage,
            ClassArg::Overlay => AssetClass::OverlayImage,
            ClassArg::Model => AssetClass::Model,
        }
    }
}

#[derive(Args, Debug)]
struct ResolveArgs {
    path: String,
    #[arg(long, value_enum, default_value = "model")]
    class: ClassArg,
    /// Viewer config file; only its `storage` section is used.
    #[arg(long, env = "GEOVIZ_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnchorArgs {
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    altitude: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    yaw: f64,
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
}

fn main() {
    viewer::logging::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), ToolError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), ToolError> {
    match cli.command {
        Command::Features(args) => {
            let (snapshot, _) = load_snapshot(&args.snapshot)?;
            let predicate = FilterPredicate::any()
                .with_text(args.text)
                .with_category(args.category)
                .with_province(args.province)
                .with_year(args.year)
                .with_client(args.client);
            if args.geojson {
                print(&feature_geojson(&snapshot, &predicate))
            } else {
                print(&feature_summary(&snapshot, &predicate))
            }
        }
        Command::Facets { snapshot } => {
            let (snapshot, _) = load_snapshot(&snapshot)?;
            print(&facet_report(&snapshot))
        }
        Command::Resolve(args) => {
            let storage = load_storage(args.config.as_deref())?;
            println!("{}", resolve_url(&args.path, args.class.into(), &storage)?);
            Ok(())
        }
        Command::InspectModel { path } => {
            let root = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            print(&inspect_model(&FileFetcher::new(root), &name)?)
        }
        Command::Anchor(a) => print(&anchor_report(a.lng, a.lat, a.altitude, a.yaw, a.scale)?),
    }
}
