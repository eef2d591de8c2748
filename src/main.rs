use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use popflows::config::DEFAULT_BASE_URL;
use popflows::fips::NATIONAL_COUNTY_URL;
use popflows::geometry::{
    flows_feature_collection, to_feature_collection, write_geojson, GeoJsonArchive, GeoJsonFile,
    GeometrySource,
};
use popflows::request::{DEFAULT_FLOWS_YEAR, DEFAULT_VINTAGE};
use popflows::table::{flows_frame, table_frame, write_csv};
use popflows::{
    estimates_with_geometry, flows_with_centroids, Breakdown, ClientConfig, EstimatesRequest,
    FipsCatalog, FlowBreakdown, FlowVariable, FlowsRequest, Geography, LocatedEstimates,
    PopClient, Product, Resolution, UnknownCodePolicy,
};

#[derive(Parser, Debug)]
#[command(name = "popflows", about = "Tidy population estimates and migration flows")]
struct Cli {
    /// Root of the data API
    #[arg(long, env = "POPFLOWS_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// API key passed through as `key=`
    #[arg(long, env = "CENSUS_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Population estimates: population, components, characteristics or housing
    Estimates(EstimatesArgs),
    /// County, county subdivision or metro migration flows
    Flows(FlowsArgs),
}

#[derive(Args, Debug)]
struct EstimatesArgs {
    #[arg(long)]
    geography: Geography,

    #[arg(long)]
    product: Product,

    #[arg(long, default_value_t = DEFAULT_VINTAGE)]
    vintage: u16,

    /// Comma-separated variable names
    #[arg(long, value_delimiter = ',')]
    variables: Vec<String>,

    /// Comma-separated breakdown dimensions (AGEGROUP, SEX, RACE, HISP)
    #[arg(long, value_delimiter = ',')]
    breakdown: Vec<Breakdown>,

    /// Decode breakdown codes into labels
    #[arg(long)]
    labels: bool,

    #[arg(long)]
    state: Option<String>,

    #[arg(long)]
    county: Option<String>,

    /// One column per variable instead of one row per variable
    #[arg(long)]
    wide: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct FlowsArgs {
    #[arg(long, default_value = "county")]
    geography: Geography,

    #[arg(long, default_value_t = DEFAULT_FLOWS_YEAR)]
    year: u16,

    /// Comma-separated subset of MOVEDIN, MOVEDOUT, MOVEDNET
    #[arg(long, value_delimiter = ',')]
    variables: Vec<FlowVariable>,

    /// Comma-separated breakdown dimensions (AGE, SEX, RACE, HSGP)
    #[arg(long, value_delimiter = ',')]
    breakdown: Vec<FlowBreakdown>,

    #[arg(long)]
    labels: bool,

    #[arg(long)]
    state: Option<String>,

    #[arg(long)]
    county: Option<String>,

    /// Five-digit CBSA code
    #[arg(long)]
    msa: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Local copy of national_county.txt, for county names
    #[arg(long)]
    counties_file: Option<PathBuf>,

    /// Download national_county.txt before resolving county names
    #[arg(long, conflicts_with = "counties_file")]
    download_counties: bool,

    /// Keep raw codes missing from the label table instead of failing
    #[arg(long)]
    pass_through_codes: bool,

    /// GeoJSON boundaries keyed by GEOID; switches output to GeoJSON
    #[arg(long)]
    geometry_file: Option<PathBuf>,

    /// Zipped GeoJSON boundaries URL; may use {vintage}, {level} and {resolution}
    #[arg(long, conflicts_with = "geometry_file", requires = "geometry_member")]
    geometry_url: Option<String>,

    /// GeoJSON file inside the --geometry-url archive
    #[arg(long)]
    geometry_member: Option<String>,

    /// Feature property holding the GEOID
    #[arg(long, default_value = "GEOID")]
    geometry_id: String,

    #[arg(long, default_value = "500k")]
    resolution: Resolution,

    /// Output path (default out.csv, or out.geojson when geometry is attached)
    #[arg(long, short)]
    out: Option<PathBuf>,
}

impl CommonArgs {
    async fn client(&self, config: ClientConfig) -> Result<PopClient> {
        let fips = if let Some(path) = &self.counties_file {
            FipsCatalog::from_path(path)
                .with_context(|| format!("reading {}", path.display()))?
        } else if self.download_counties {
            FipsCatalog::download(NATIONAL_COUNTY_URL).await?
        } else {
            FipsCatalog::states_only()
        };
        let policy = if self.pass_through_codes {
            UnknownCodePolicy::PassThrough
        } else {
            UnknownCodePolicy::Fail
        };
        Ok(PopClient::from_config(config)
            .with_fips(fips)
            .with_unknown_codes(policy))
    }

    fn geometry(&self) -> Option<Box<dyn GeometrySource + Send + Sync>> {
        if let Some(path) = &self.geometry_file {
            return Some(Box::new(
                GeoJsonFile::new(path).with_id_property(&self.geometry_id),
            ));
        }
        match (&self.geometry_url, &self.geometry_member) {
            (Some(url), Some(member)) => Some(Box::new(
                GeoJsonArchive::new(url, member).with_id_property(&self.geometry_id),
            )),
            _ => None,
        }
    }

    fn out(&self) -> PathBuf {
        self.out.clone().unwrap_or_else(|| {
            if self.geometry_file.is_some() || self.geometry_url.is_some() {
                PathBuf::from("out.geojson")
            } else {
                PathBuf::from("out.csv")
            }
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::default().with_base_url(&cli.base_url);
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key);
    }

    match cli.command {
        Command::Estimates(args) => run_estimates(args, config).await,
        Command::Flows(args) => run_flows(args, config).await,
    }
}

async fn run_estimates(args: EstimatesArgs, config: ClientConfig) -> Result<()> {
    let client = args.common.client(config).await?;
    let mut request = EstimatesRequest::new(args.geography, args.product)
        .vintage(args.vintage)
        .variables(args.variables)
        .breakdown(args.breakdown)
        .breakdown_labels(args.labels);
    request.state = args.state;
    request.county = args.county;

    let table = client.get_estimates(&request).await?;
    let out = args.common.out();

    if let Some(source) = args.common.geometry() {
        let located =
            estimates_with_geometry(table, &request, source.as_ref(), args.common.resolution, None)
                .await?;
        let collection = match &located {
            LocatedEstimates::Long(rows) => to_feature_collection(rows),
            LocatedEstimates::Characteristics(rows) => to_feature_collection(rows),
        };
        write_features(&out, collection)?;
    } else {
        let mut df = table_frame(&table, args.wide)?;
        println!("{df}");
        write_csv(&out, &mut df)?;
    }
    tracing::info!(out = %out.display(), "written");
    Ok(())
}

async fn run_flows(args: FlowsArgs, config: ClientConfig) -> Result<()> {
    let client = args.common.client(config).await?;
    let mut request = FlowsRequest::new(args.geography)
        .year(args.year)
        .variables(args.variables)
        .breakdown(args.breakdown)
        .breakdown_labels(args.labels);
    request.state = args.state;
    request.county = args.county;
    request.msa = args.msa;

    let flows = client.get_flows(&request).await?;
    let out = args.common.out();

    if let Some(source) = args.common.geometry() {
        let located =
            flows_with_centroids(flows, &request, source.as_ref(), args.common.resolution, args.year)
                .await?;
        write_features(&out, flows_feature_collection(&located))?;
    } else {
        let mut df = flows_frame(&flows)?;
        println!("{df}");
        write_csv(&out, &mut df)?;
    }
    tracing::info!(out = %out.display(), "written");
    Ok(())
}

/// `RUST_LOG` when it parses, `info` otherwise.
fn log_filter(rust_log: Option<String>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| "info".into())
}

fn write_features(out: &Path, collection: geojson::FeatureCollection) -> Result<()> {
    let features = collection.features.len();
    write_geojson(out, collection)?;
    tracing::info!(features, "wrote GeoJSON");
    Ok(())
}
