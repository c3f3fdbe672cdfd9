use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use geofilter::config::GeoFilterConfig;
use geofilter::core::{CombineOperator, ProviderType};
use geofilter::filter::subset;
use geofilter::optimize::{
    classify_source, FilterSettingsSnapshot, GeometryComplexity, LayerProfile,
};
use geofilter::GeoFilter;

/// geofilter - backend-aware spatial filter tooling
#[derive(Parser, Debug)]
#[command(name = "geofilter", version, about, long_about = None)]
struct Cli {
    /// 配置文件（默认 <config_dir>/geofilter/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify an existing subset string and show the combine strategy
    Classify {
        subset: String,
        /// Combine operator override ("AND", "OR", "AND NOT")
        #[arg(long)]
        operator: Option<String>,
    },

    /// Recommend optimizations for a layer description
    Advise {
        /// Data source URI
        #[arg(long)]
        source: String,
        /// postgres | spatialite | ogr | memory
        #[arg(long, default_value = "ogr")]
        provider: String,
        #[arg(long, default_value_t = 0)]
        features: u64,
        /// Average vertices per feature
        #[arg(long)]
        vertices: Option<f64>,
        #[arg(long)]
        spatial_index: Option<bool>,
        /// A buffer is configured
        #[arg(long)]
        buffer: bool,
        /// Explicit buffer segments
        #[arg(long)]
        segments: Option<u32>,
        /// Centroid substitution already enabled
        #[arg(long)]
        centroid: bool,
        #[arg(long)]
        source_layer: bool,
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GeoFilterConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Classify { subset: text, operator } => {
            let op = match operator {
                Some(s) => CombineOperator::parse(&s)
                    .with_context(|| format!("unknown combine operator: {s}"))?,
                None => config.filter.combine_operator,
            };
            let strategy = subset::subset_strategy(Some(&text), op);
            println!("kind:      {:?}", subset::classify(&text));
            println!("corrupted: {}", subset::is_corrupted(&text));
            match strategy.combine {
                Some(op) => println!("strategy:  combine with {op}"),
                None if strategy.previous.is_some() => {
                    println!("strategy:  replace (previous kept for cache association)")
                }
                None => println!("strategy:  replace"),
            }
        }

        Command::Advise {
            source,
            provider,
            features,
            vertices,
            spatial_index,
            buffer,
            segments,
            centroid,
            source_layer,
            json,
        } => {
            let provider = ProviderType::parse(&provider)
                .with_context(|| format!("unknown provider: {provider}"))?;
            let profile = LayerProfile {
                layer_id: source.clone(),
                location_type: classify_source(provider, &source),
                feature_count: features,
                geometry_complexity: GeometryComplexity::from_avg_vertices(vertices),
                has_spatial_index: spatial_index,
            };
            let settings = FilterSettingsSnapshot {
                user_centroid_enabled: centroid,
                has_buffer: buffer,
                has_buffer_type: segments.is_some(),
                buffer_segments: segments.unwrap_or_default(),
                is_source_layer: source_layer,
            };

            let engine = GeoFilter::new(config);
            let recs = engine.advisor().recommend(&profile, &settings);

            if json {
                let out = serde_json::json!({
                    "profile": profile,
                    "recommendations": recs,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "{} ({:?}, {} features, complexity {:?})",
                    profile.layer_id,
                    profile.location_type,
                    profile.feature_count,
                    profile.geometry_complexity
                );
                if recs.is_empty() {
                    println!("  already optimal");
                }
                for rec in &recs {
                    println!(
                        "  - {:?}{}: {}",
                        rec.kind,
                        if rec.auto_applicable { "" } else { " (manual)" },
                        rec.rationale
                    );
                }
            }
        }

        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
