use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use usfconv_core::config::ConverterConfig;
use usfconv_core::convert::{
    gltf_to_usf, usf_to_gltf, AssetKind, ConversionWarning, ConvertError, ExportOptions,
    ImportOptions,
};
use usfconv_core::gltf::GltfDocument;
use usfconv_core::usf::{read_usf, write_usf};

const USAGE: &str = "Usage: usfconv <input> <output> [--config <json>] [--hierarchy <usf>] [--kind character|prop|auto]";

/// Parsed command line
#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    hierarchy: Option<PathBuf>,
    kind: AssetKind,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut hierarchy = None;
    let mut kind = AssetKind::Auto;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "--hierarchy" | "--kind" => {
                let value = iter
                    .next()
                    .with_context(|| format!("{} needs a value\n{}", arg, USAGE))?;
                match arg.as_str() {
                    "--config" => config = Some(PathBuf::from(value)),
                    "--hierarchy" => hierarchy = Some(PathBuf::from(value)),
                    _ => {
                        kind = AssetKind::parse(value)
                            .with_context(|| format!("Unknown asset kind '{}'", value))?
                    }
                }
            }
            flag if flag.starts_with("--") => bail!("Unknown option '{}'\n{}", flag, USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let [input, output] = <[PathBuf; 2]>::try_from(positional)
        .map_err(|_| anyhow::anyhow!("Expected an input and an output path\n{}", USAGE))?;
    Ok(Args {
        input,
        output,
        config,
        hierarchy,
        kind,
    })
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_gltf(path: &Path) -> bool {
    has_extension(path, "gltf") || has_extension(path, "glb")
}

fn report(warnings: &[ConversionWarning]) {
    if warnings.is_empty() {
        return;
    }
    log::warn!("{} warning(s):", warnings.len());
    for warning in warnings {
        log::warn!("  {}", warning);
    }
}

fn import(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ConverterConfig::load(path)
            .map_err(ConvertError::from)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConverterConfig::default(),
    };
    let hierarchy = match &args.hierarchy {
        Some(path) => Some(
            read_usf(path).with_context(|| format!("Failed to read hierarchy {}", path.display()))?,
        ),
        None => None,
    };

    let doc = GltfDocument::open(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    log::info!(
        "Loaded {}: {} nodes, {} meshes, {} animations",
        args.input.display(),
        doc.node_count(),
        doc.mesh_count(),
        doc.animation_count()
    );

    let options = ImportOptions {
        kind: args.kind,
        hierarchy,
    };
    let mut result = gltf_to_usf(&doc, &config, &options)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    report(&result.warnings);

    result.output.source_path = args.input.display().to_string();
    write_usf(&result.output, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    log::info!(
        "Wrote {} ({} nodes)",
        args.output.display(),
        result.output.node_count()
    );
    Ok(())
}

fn export(args: &Args) -> Result<()> {
    let scene = read_usf(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    log::info!("Loaded {}: {} nodes", args.input.display(), scene.node_count());

    let result = usf_to_gltf(&scene)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    report(&result.warnings);

    let options = ExportOptions {
        binary: has_extension(&args.output, "glb"),
    };
    let bytes = options
        .encode(&result.output)
        .context("Failed to encode glTF")?;
    std::fs::write(&args.output, bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    log::info!("Wrote {}", args.output.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let argv: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&argv)?;

    if is_gltf(&args.input) {
        import(&args)
    } else {
        export(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_positional() {
        let args = parse_args(&argv("hero.glb hero.usf")).unwrap();
        assert_eq!(args.input, PathBuf::from("hero.glb"));
        assert_eq!(args.output, PathBuf::from("hero.usf"));
        assert_eq!(args.kind, AssetKind::Auto);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_options() {
        let args = parse_args(&argv(
            "--kind prop gun.gltf gun.usf --config rules.json --hierarchy rig.usf",
        ))
        .unwrap();
        assert_eq!(args.kind, AssetKind::Prop);
        assert_eq!(args.config, Some(PathBuf::from("rules.json")));
        assert_eq!(args.hierarchy, Some(PathBuf::from("rig.usf")));
        assert_eq!(args.output, PathBuf::from("gun.usf"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&argv("only_input.glb")).is_err());
        assert!(parse_args(&argv("a.glb b.usf --kind vehicle")).is_err());
        assert!(parse_args(&argv("a.glb b.usf --config")).is_err());
        assert!(parse_args(&argv("a.glb b.usf --verbose")).is_err());
    }

    #[test]
    fn test_direction_from_extension() {
        assert!(is_gltf(Path::new("hero.GLB")));
        assert!(is_gltf(Path::new("hero.gltf")));
        assert!(!is_gltf(Path::new("hero.usf")));
        assert!(has_extension(Path::new("out.glb"), "glb"));
    }
}
