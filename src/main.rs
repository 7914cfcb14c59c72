use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use pano_compositer::image::io;
use pano_compositer::{
    load_scene, Error, MultiBandCompositer, TileStore, TileStoreOptions,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> pano_compositer::Result<()> {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "pano_compositer".to_string());
    let cli = parse_args(&program).map_err(|reason| Error::InvalidConfiguration { reason })?;

    let scene = load_scene(&cli.scene)?;
    let mut options = scene.options.clone();
    if let Some(levels) = cli.max_levels {
        options.max_levels = Some(levels);
    }
    if let Some(size) = cli.tile_size {
        options.tile_size = size;
    }
    if let Some(cap) = cli.max_resident_tiles {
        options.max_resident_tiles = cap;
    }
    if let Some(dir) = cli.scratch_dir {
        options.scratch_dir = Some(dir);
    }

    let mut store_options = TileStoreOptions::default()
        .with_tile_size(options.tile_size)
        .with_max_resident_tiles(options.max_resident_tiles);
    if let Some(dir) = &options.scratch_dir {
        store_options = store_options.with_scratch_dir(dir);
    }
    info!(
        "tile store: {}x{} tiles, {} resident, scratch {}",
        store_options.tile_width,
        store_options.tile_height,
        store_options.max_resident_tiles,
        store_options.scratch_dir.display()
    );
    let store = Arc::new(TileStore::create(store_options)?);

    let mut compositer = MultiBandCompositer::initialize(
        &store,
        scene.panorama_width,
        scene.panorama_height,
        options,
    )?;

    for view in &scene.views {
        info!("load view {}", view.color.display());
        let color = io::load_color(&view.color)?;
        let mask = io::load_mask(&view.mask)?;
        let weight = io::load_weight(&view.weight)?;
        compositer.append(&color, &mask, &weight, view.offset_x, view.offset_y)?;
    }

    compositer.terminate()?;
    compositer.save(&cli.output)?;
    info!("panorama written to {}", cli.output.display());

    Ok(())
}

struct CliConfig {
    scene: PathBuf,
    output: PathBuf,
    max_levels: Option<usize>,
    tile_size: Option<usize>,
    max_resident_tiles: Option<usize>,
    scratch_dir: Option<PathBuf>,
}

fn parse_args(program: &str) -> Result<CliConfig, String> {
    let mut args = env::args().skip(1);
    let mut scene: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut max_levels: Option<usize> = None;
    let mut tile_size: Option<usize> = None;
    let mut max_resident_tiles: Option<usize> = None;
    let mut scratch_dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{}", usage(program));
                std::process::exit(0);
            }
            "--output" | "-o" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--output expects a path\n{}", usage(program)))?;
                output = Some(PathBuf::from(value));
            }
            "--max-levels" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--max-levels expects a value\n{}", usage(program)))?;
                let parsed: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid level count '{value}'"))?;
                max_levels = Some(parsed);
            }
            "--tile-size" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--tile-size expects a value\n{}", usage(program)))?;
                let parsed: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid tile size '{value}'"))?;
                tile_size = Some(parsed);
            }
            "--max-resident-tiles" => {
                let value = args.next().ok_or_else(|| {
                    format!("--max-resident-tiles expects a value\n{}", usage(program))
                })?;
                let parsed: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid tile cap '{value}'"))?;
                max_resident_tiles = Some(parsed);
            }
            "--scratch-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--scratch-dir expects a path\n{}", usage(program)))?;
                scratch_dir = Some(PathBuf::from(value));
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'\n{}", usage(program)));
            }
            _ => {
                if scene.is_some() {
                    return Err(format!(
                        "Unexpected positional argument '{arg}'\n{}",
                        usage(program)
                    ));
                }
                scene = Some(PathBuf::from(arg));
            }
        }
    }

    let scene = scene.ok_or_else(|| usage(program))?;
    let output = output.ok_or_else(|| format!("--output is required\n{}", usage(program)))?;
    Ok(CliConfig {
        scene,
        output,
        max_levels,
        tile_size,
        max_resident_tiles,
        scratch_dir,
    })
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} <scene.json> --output panorama.exr [--max-levels N] \\\n         [--tile-size N] [--max-resident-tiles N] [--scratch-dir DIR]\n\n\
Blends the warped views listed in the scene file into a seamless panorama.\n\
Examples:\n  {program} scene.json --output pano.exr\n  {program} scene.json -o pano.png --max-levels 6 --max-resident-tiles 200\n"
    )
}
