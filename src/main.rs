use anyhow::{Context, Result, bail};
use clap::Parser;
use glam::DVec3;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

use usdproxy::cli::Args;
use usdproxy::config::{self, PathConfig, Settings};
use usdproxy::core::stage_cache::CacheStatsSnapshot;
use usdproxy::entities::keys::*;
use usdproxy::entities::{BoundsIntersector, ProxyHooks, SelectionMask, StageEnv, SurfaceHit};
use usdproxy::entities::proxy_shape::PROXY_NODE_TYPE;
use usdproxy::usd::{FsResolver, JsonComposer, Ray};
use usdproxy::{DependencyGraph, StageCache};

#[derive(Serialize)]
struct BoundsSample {
    time: f64,
    min: [f64; 3],
    max: [f64; 3],
}

#[derive(Serialize)]
struct RayReport {
    point: [f64; 3],
    normal: [f64; 3],
}

#[derive(Serialize)]
struct Report {
    file: String,
    prim: String,
    resolved_prim: String,
    prim_type: String,
    status: String,
    stage_valid: bool,
    selection_mask: SelectionMask,
    complexity: i32,
    bounds: Vec<BoundsSample>,
    ray_hit: Option<RayReport>,
    bounds_cache: BoundsCacheReport,
    stage_cache: CacheStatsSnapshot,
}

#[derive(Serialize)]
struct BoundsCacheReport {
    entries: usize,
    hits: u64,
    misses: u64,
}

fn init_logging(args: &Args, paths: &PathConfig, settings: &Settings) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths.config_file(config::LOG_FILE));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins, then settings, then -v flags
        let default_filter = match (args.verbosity, &settings.log_filter) {
            (0, Some(filter)) => filter.clone(),
            (0, None) => "warn".to_string(),
            (1, _) => "info".to_string(),
            (2, _) => "debug".to_string(),
            _ => "trace".to_string(),
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn ray_from_args(values: &[f64]) -> Result<Ray> {
    let [ox, oy, oz, dx, dy, dz] = values else {
        bail!("--ray needs 6 values, got {}", values.len());
    };
    let dir = DVec3::new(*dx, *dy, *dz);
    if dir.length_squared() == 0.0 {
        bail!("--ray direction must be non-zero");
    }
    Ok(Ray::new(DVec3::new(*ox, *oy, *oz), dir))
}

fn print_human(report: &Report) {
    println!("File:       {}", report.file);
    println!("Prim:       {} -> {} ({})", report.prim, report.resolved_prim, report.prim_type);
    println!("Status:     {}", report.status);
    println!("Valid:      {}", report.stage_valid);
    println!("Selection:  {}", report.selection_mask);
    println!("Complexity: {}", report.complexity);
    for b in &report.bounds {
        println!(
            "  t={:<8} min=({:.3}, {:.3}, {:.3}) max=({:.3}, {:.3}, {:.3})",
            b.time, b.min[0], b.min[1], b.min[2], b.max[0], b.max[1], b.max[2]
        );
    }
    match &report.ray_hit {
        Some(hit) => println!(
            "Ray hit:    ({:.3}, {:.3}, {:.3}) normal ({}, {}, {})",
            hit.point[0], hit.point[1], hit.point[2], hit.normal[0], hit.normal[1], hit.normal[2]
        ),
        None => println!("Ray hit:    none"),
    }
    println!(
        "Bounds cache: {} entries, {} hits, {} misses",
        report.bounds_cache.entries, report.bounds_cache.hits, report.bounds_cache.misses
    );
    let s = &report.stage_cache;
    println!(
        "Stage cache:  {} compositions, {} hits, {} misses ({:.0}% hit rate)",
        s.compositions,
        s.hits,
        s.misses,
        s.hit_rate() * 100.0
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    let paths = PathConfig::from_env_and_cli(args.config_dir.clone());
    let settings = Settings::load_default(&paths).unwrap_or_else(|e| {
        eprintln!("Warning: {:#}", e);
        Settings::default()
    });
    init_logging(&args, &paths, &settings)?;
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", paths.config_file(config::SETTINGS_FILE).display());

    let Some(file_path) = args.file_path.clone() else {
        use clap::CommandFactory;
        Args::command().print_help()?;
        println!();
        return Ok(());
    };

    let mut search_paths = args.search_paths.clone();
    search_paths.extend(settings.search_paths.iter().cloned());
    let env = StageEnv::new(
        Arc::new(FsResolver::with_search_paths(search_paths)),
        Arc::new(JsonComposer::default()),
        StageCache::global(),
    );

    let mut graph = DependencyGraph::new(env);
    graph.register_type(PROXY_NODE_TYPE, ProxyHooks::default().with_closest_point(BoundsIntersector));
    let id = graph.create_node(PROXY_NODE_TYPE, "proxyShape1")?;

    let purposes = settings.purposes();
    graph.set_attr(id, A_FILE_PATH, file_path.clone().into())?;
    graph.set_attr(id, A_PRIM_PATH, args.prim_path.clone().unwrap_or_default().into())?;
    graph.set_attr(id, A_EXCLUDE_PRIM_PATHS, args.exclude_attr().into())?;
    graph.set_attr(id, A_COMPLEXITY, args.complexity.unwrap_or(settings.complexity).into())?;
    graph.set_attr(id, A_DRAW_RENDER_PURPOSE, (purposes.render || args.render).into())?;
    graph.set_attr(id, A_DRAW_PROXY_PURPOSE, (purposes.proxy && !args.no_proxy).into())?;
    graph.set_attr(id, A_DRAW_GUIDE_PURPOSE, (purposes.guide || args.guide).into())?;

    let shape = graph
        .shape_at(id)
        .with_context(|| format!("Node {} vanished", id))?;

    let times = if args.times.is_empty() { vec![config::DEFAULT_TIME] } else { args.times.clone() };
    let mut bounds = Vec::with_capacity(times.len());
    for t in &times {
        graph.set_attr(id, A_TIME, (*t).into())?;
        let bbox = shape.bounding_box();
        bounds.push(BoundsSample {
            time: shape.output_time().value(),
            min: bbox.min.to_array(),
            max: bbox.max.to_array(),
        });
    }
    let redraws = graph.process_events();
    debug!("{} node(s) flagged for redraw", redraws.len());

    let ray_hit = match &args.ray {
        Some(values) => shape.closest_point(&ray_from_args(values)?).map(|SurfaceHit { point, normal }| RayReport {
            point: point.to_array(),
            normal: normal.to_array(),
        }),
        None => None,
    };

    let prim = shape.usd_prim();
    let (hits, misses) = shape.bounds_cache_stats();
    let report = Report {
        file: file_path,
        prim: shape.prim_path(),
        resolved_prim: prim.path().to_string(),
        prim_type: prim.type_name(),
        status: shape.status().to_string(),
        stage_valid: shape.is_stage_valid(),
        selection_mask: shape.get_shape_selection_mask(),
        complexity: shape.get_complexity(),
        bounds,
        ray_hit,
        bounds_cache: BoundsCacheReport {
            entries: shape.bounds_cache_len(),
            hits,
            misses,
        },
        stage_cache: graph.env().cache.stats(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human(&report);
    }

    Ok(())
}
