//! tileraster - a tiled, pyramidal raster storage engine backed by an
//! embedded SQLite database.
//!
//! This binary is a thin front-end over [`tileraster::Engine`]: one verb per
//! CLI subcommand, translating parsed arguments into `Engine` calls and
//! printing a single explanatory line per error (spec §7 "User-visible
//! behaviour").

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tileraster::config::{Cli, Command, CreateArgs, ExportArgs, ExportFormat, ImportArgs, MapArgs, PyramidizeArgs};
use tileraster::engine::{Engine, EngineConfig, ExportTarget};
use tileraster::error::EngineError;
use tileraster::import::ImportOptions;
use tileraster::pixel::Pixel;
use tileraster::reader::ReadRequest;
use tileraster::schema::CoverageMeta;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = EngineConfig { allow_file_io: cli.allow_file_io };
    let mut engine = match Engine::open(&cli.db, config) {
        Ok(engine) => engine,
        Err(e) => return fail(&e),
    };

    let result = match cli.command {
        Command::Create(args) => run_create(&mut engine, args),
        Command::Drop(args) => run_drop(&mut engine, &args.coverage),
        Command::Import(args) => run_import(&mut engine, args),
        Command::Export(args) => run_export(&mut engine, args),
        Command::Delete(args) => run_delete(&mut engine, &args.coverage, args.section_id),
        Command::Pyramidize(args) => run_pyramidize(&mut engine, args),
        Command::List(args) => run_list(&engine, &args.coverage),
        Command::Catalog => run_catalog(&engine),
        Command::Map(args) => run_map(&engine, args),
        Command::Check(args) => run_check(&engine, args.coverage.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn fail(e: &EngineError) -> ExitCode {
    error!("{e}");
    ExitCode::FAILURE
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "tileraster=debug" } else { "tileraster=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| env_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Create / Drop
// =============================================================================

fn run_create(engine: &mut Engine, args: CreateArgs) -> Result<(), EngineError> {
    let (h_res, v_res) = args.resolved_resolution().map_err(EngineError::InvalidArgument)?;

    let no_data_pixel = match args.no_data {
        Some(value) => {
            let samples = vec![value; args.bands as usize];
            Some(Pixel::from_samples(args.sample_type, args.pixel_type, samples).map_err(|e| EngineError::InvalidArgument(e.to_string()))?)
        }
        None => None,
    };

    let meta = CoverageMeta {
        name: args.coverage,
        sample_type: args.sample_type,
        pixel_type: args.pixel_type,
        bands: args.bands,
        compression: args.compression,
        quality: args.quality,
        tile_width: args.tile_width,
        tile_height: args.tile_height,
        srid: args.srid,
        h_res,
        v_res,
        no_data_pixel,
        palette: None,
        strict_resolution: args.strict_resolution,
        mixed_resolutions: args.mixed_resolutions,
        section_paths: args.section_paths,
        section_md5: args.section_md5,
        section_summary: args.section_summary,
    };

    engine.create_coverage(&meta)?;
    info!("created coverage {:?}", meta.name);
    Ok(())
}

fn run_drop(engine: &mut Engine, coverage: &str) -> Result<(), EngineError> {
    engine.drop_coverage(coverage)?;
    info!("dropped coverage {coverage:?}");
    Ok(())
}

// =============================================================================
// Import
// =============================================================================

fn run_import(engine: &mut Engine, args: ImportArgs) -> Result<(), EngineError> {
    let meta = engine.fetch_coverage(&args.coverage)?;
    let opts = ImportOptions { force_srid: args.srid, pyramidize_now: args.pyramidize_now };

    match (args.src_path, args.dir_path) {
        (Some(path), None) => {
            let section_name = args
                .section
                .unwrap_or_else(|| path.file_stem().and_then(|s| s.to_str()).unwrap_or("section").to_string());
            let section_id = engine.import_raster(&meta, &path, &section_name, &opts)?;
            info!("imported section {section_id} into {:?}", meta.name);
        }
        (None, Some(dir)) => {
            let report = engine.import_rasters_from_dir(&meta, &dir, &opts)?;
            info!("imported {} section(s) into {:?}", report.imported.len(), meta.name);
            for (path, reason) in &report.skipped {
                error!("skipped {path}: {reason}");
            }
        }
        _ => return Err(EngineError::InvalidArgument("exactly one of --src-path or --dir-path is required".to_string())),
    }
    Ok(())
}

// =============================================================================
// Export / Map
// =============================================================================

fn run_export(engine: &mut Engine, args: ExportArgs) -> Result<(), EngineError> {
    let meta = engine.fetch_coverage(&args.coverage)?;
    let req = ReadRequest {
        width: args.out_width,
        height: args.out_height,
        minx: args.minx,
        miny: args.miny,
        maxx: args.maxx,
        maxy: args.maxy,
        section_id: args.section_id,
        bands: None,
    };

    if args.format == ExportFormat::Png {
        let bytes = engine.get_map_image(&meta, &req)?;
        std::fs::write(&args.dst_path, bytes).map_err(|e| EngineError::Io(e.to_string()))?;
    } else {
        let target = match args.format {
            ExportFormat::Tiff => ExportTarget::Tiff,
            ExportFormat::TiffTfw => ExportTarget::TiffTfw,
            ExportFormat::GeoTiff => ExportTarget::GeoTiff,
            ExportFormat::AsciiGrid => ExportTarget::AsciiGrid { no_data: args.no_data },
            ExportFormat::Png => unreachable!("handled above"),
        };
        engine.write_window(&meta, &req, target, &args.dst_path)?;
    }
    info!("exported {:?} window to {}", meta.name, args.dst_path.display());
    Ok(())
}

fn run_map(engine: &Engine, args: MapArgs) -> Result<(), EngineError> {
    let meta = engine.fetch_coverage(&args.coverage)?;
    let req = ReadRequest {
        width: args.out_width,
        height: args.out_height,
        minx: args.minx,
        miny: args.miny,
        maxx: args.maxx,
        maxy: args.maxy,
        section_id: None,
        bands: None,
    };
    let bytes = engine.get_map_image(&meta, &req)?;
    std::fs::write(&args.dst_path, bytes).map_err(|e| EngineError::Io(e.to_string()))?;
    info!("wrote map of {:?} to {}", meta.name, args.dst_path.display());
    Ok(())
}

// =============================================================================
// Delete / Pyramidize
// =============================================================================

fn run_delete(engine: &mut Engine, coverage: &str, section_id: i64) -> Result<(), EngineError> {
    let meta = engine.fetch_coverage(coverage)?;
    engine.delete_section(&meta, section_id)?;
    info!("deleted section {section_id} from {coverage:?}");
    Ok(())
}

fn run_pyramidize(engine: &mut Engine, args: PyramidizeArgs) -> Result<(), EngineError> {
    let meta = engine.fetch_coverage(&args.coverage)?;
    if args.drop {
        engine.depyramidize(&meta, args.section_id)?;
        info!("dropped pyramid levels for section {} of {:?}", args.section_id, meta.name);
    } else {
        engine.pyramidize(&meta, args.section_id, args.force)?;
        info!("built pyramid levels for section {} of {:?}", args.section_id, meta.name);
    }
    Ok(())
}

// =============================================================================
// List / Catalog / Check
// =============================================================================

fn run_list(engine: &Engine, coverage: &str) -> Result<(), EngineError> {
    let meta = engine.fetch_coverage(coverage)?;
    for s in engine.list_sections(&meta)? {
        println!("{}\t{}\t{}x{}\t({}, {}) - ({}, {})", s.section_id, s.section_name, s.width, s.height, s.minx, s.miny, s.maxx, s.maxy);
    }
    Ok(())
}

fn run_catalog(engine: &Engine) -> Result<(), EngineError> {
    for meta in engine.list_coverages()? {
        println!("{}\t{:?}\t{:?}\tbands={}", meta.name, meta.sample_type, meta.pixel_type, meta.bands);
    }
    Ok(())
}

fn run_check(engine: &Engine, coverage: Option<&str>) -> Result<(), EngineError> {
    let coverages = match coverage {
        Some(name) => vec![engine.fetch_coverage(name)?],
        None => engine.list_coverages()?,
    };

    let mut any_problem = false;
    for meta in &coverages {
        let report = engine.check_coverage(meta)?;
        println!("{}: {} section(s), {} tile(s) checked, {} problem(s)", meta.name, report.sections_checked, report.tiles_checked, report.problems.len());
        for problem in &report.problems {
            println!("  {problem}");
        }
        any_problem |= !report.is_clean();
    }

    if any_problem {
        return Err(EngineError::InvalidArgument("one or more coverages failed validation".to_string()));
    }
    Ok(())
}
