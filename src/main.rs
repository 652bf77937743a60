//! folio – command-line pagination and PDF export.
//!
//! Usage:
//!   folio <input.html|input.json> [output.pdf] [--raster] [--paper A4]
//!         [--landscape] [--margin 2cm] [--title "My Report"] ...
//!
//! If `output.pdf` is omitted the PDF is written next to the input file with
//! the same stem (e.g. `report.html` → `report.pdf`).

use std::{env, fs, path::PathBuf, process};

use folio::assets::AssetStore;
use folio::dom;
use folio::fonts::FontManager;
use folio::geometry::{PageOrientation, PaperSize};
use folio::pipeline::{export_pdf, ExportConfig, ExportMode};

#[derive(Default)]
struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    manifest: Option<PathBuf>,
    fonts: Vec<PathBuf>,
    title: Option<String>,
    paper: Option<PaperSize>,
    landscape: bool,
    raster: bool,
    scale: Option<f32>,
    margin: Option<String>,
    margin_top: Option<String>,
    margin_bottom: Option<String>,
    margin_left: Option<String>,
    margin_right: Option<String>,
}

fn main() {
    env_logger::init();

    let argv: Vec<String> = env::args().collect();
    let args = parse_args(&argv);

    let input = match &args.input {
        Some(p) => p.clone(),
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&argv[0]);
            process::exit(1);
        }
    };

    // Default output: same directory + same stem as input, but with .pdf
    let output = args.output.clone().unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension("pdf");
        o
    });

    let source = read_or_exit(&input);
    let content = if input.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        dom::from_json(&source).unwrap_or_else(|e| {
            eprintln!("Error parsing '{}': {e}", input.display());
            process::exit(1);
        })
    } else {
        dom::parse_document(&source)
    };

    let config = build_config(&args, &input);

    let mut fonts = FontManager::default();
    for path in &args.fonts {
        let family = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Custom")
            .to_string();
        let bytes = fs::read(path).unwrap_or_else(|e| {
            eprintln!("Error reading font '{}': {e}", path.display());
            process::exit(1);
        });
        if let Err(e) = fonts.load_font(&family, false, false, bytes) {
            eprintln!("Error loading font '{}': {e}", path.display());
            process::exit(1);
        }
    }

    let assets = match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => AssetStore::with_base_dir(dir),
        _ => AssetStore::with_base_dir("."),
    };

    match export_pdf(content, &config, &fonts, assets) {
        Ok(out) => {
            write_or_exit(&output, &out.pdf);
            if let Some(path) = &args.manifest {
                write_or_exit(path, out.manifest.to_json().as_bytes());
            }
            let pages = out.manifest.page_count;
            eprintln!(
                "Wrote '{}' ({} bytes, {} page{})",
                output.display(),
                out.pdf.len(),
                pages,
                if pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    }
}

fn parse_args(argv: &[String]) -> Args {
    let mut args = Args::default();
    let mut positional = 0usize;
    let mut iter = argv.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--landscape" | "-l" => args.landscape = true,
            "--raster" | "-r" => args.raster = true,
            "--title" | "-t" => args.title = Some(next_value(arg, &mut iter, &argv[0])),
            "--paper" | "-p" => {
                let name = next_value(arg, &mut iter, &argv[0]);
                match PaperSize::from_name(&name) {
                    Some(p) => args.paper = Some(p),
                    None => {
                        eprintln!("Unknown paper size: {name} (expected A4, A5, Letter or Legal)");
                        process::exit(1);
                    }
                }
            }
            "--scale" => {
                let raw = next_value(arg, &mut iter, &argv[0]);
                match raw.parse::<f32>() {
                    Ok(s) if s.is_finite() && s > 0.0 => args.scale = Some(s),
                    _ => {
                        eprintln!("Invalid scale: {raw}");
                        process::exit(1);
                    }
                }
            }
            "--margin" | "-m" => args.margin = Some(next_value(arg, &mut iter, &argv[0])),
            "--margin-top" => args.margin_top = Some(next_value(arg, &mut iter, &argv[0])),
            "--margin-bottom" => args.margin_bottom = Some(next_value(arg, &mut iter, &argv[0])),
            "--margin-left" => args.margin_left = Some(next_value(arg, &mut iter, &argv[0])),
            "--margin-right" => args.margin_right = Some(next_value(arg, &mut iter, &argv[0])),
            "--font" => args.fonts.push(PathBuf::from(next_value(arg, &mut iter, &argv[0]))),
            "--config" | "-c" => args.config = Some(PathBuf::from(next_value(arg, &mut iter, &argv[0]))),
            "--manifest" => args.manifest = Some(PathBuf::from(next_value(arg, &mut iter, &argv[0]))),
            "--help" | "-h" => {
                print_usage(&argv[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&argv[0]);
                process::exit(1);
            }
            path => {
                match positional {
                    0 => args.input = Some(PathBuf::from(path)),
                    1 => args.output = Some(PathBuf::from(path)),
                    _ => {
                        eprintln!("Unexpected argument: {path}");
                        print_usage(&argv[0]);
                        process::exit(1);
                    }
                }
                positional += 1;
            }
        }
    }
    args
}

fn next_value<'a>(flag: &str, iter: &mut impl Iterator<Item = &'a String>, prog: &str) -> String {
    iter.next().cloned().unwrap_or_else(|| {
        eprintln!("Missing value for {flag}");
        print_usage(prog);
        process::exit(1);
    })
}

/// Config file first, then command-line overrides.
fn build_config(args: &Args, input: &std::path::Path) -> ExportConfig {
    let mut config = match &args.config {
        Some(path) => ExportConfig::from_json(&read_or_exit(path)).unwrap_or_else(|e| {
            eprintln!("Error in config '{}': {e}", path.display());
            process::exit(1);
        }),
        None => ExportConfig {
            // Default title: stem of the input filename.
            title: input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("folio output")
                .to_string(),
            ..ExportConfig::default()
        },
    };

    if let Some(title) = &args.title {
        config.title = title.clone();
    }
    if let Some(paper) = args.paper {
        config.paper = paper;
    }
    if args.landscape {
        config.orientation = PageOrientation::Landscape;
    }
    if args.raster {
        config.mode = ExportMode::Raster;
    }
    if let Some(scale) = args.scale {
        config.scale = scale;
    }

    let margins = &mut config.margins;
    if let Some(all) = &args.margin {
        for side in [
            &mut margins.top,
            &mut margins.bottom,
            &mut margins.left,
            &mut margins.right,
        ] {
            *side = Some(all.clone());
        }
    }
    for (side, value) in [
        (&mut margins.top, &args.margin_top),
        (&mut margins.bottom, &args.margin_bottom),
        (&mut margins.left, &args.margin_left),
        (&mut margins.right, &args.margin_right),
    ] {
        if value.is_some() {
            *side = value.clone();
        }
    }
    config
}

fn read_or_exit(path: &std::path::Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading '{}': {e}", path.display());
        process::exit(1);
    })
}

fn write_or_exit(path: &std::path::Path, bytes: &[u8]) {
    // Create output directory if necessary.
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(path, bytes) {
        eprintln!("Error writing '{}': {e}", path.display());
        process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("folio – paginate rich content and export it as PDF");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.html|input.json> [output.pdf] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input>        HTML document or JSON content tree");
    eprintln!("  [output.pdf]   Output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --title, -t    Document title in PDF metadata (default: input filename stem)");
    eprintln!("  --paper, -p    Paper size: A4, A5, Letter, Legal (default: A4)");
    eprintln!("  --landscape    Landscape orientation");
    eprintln!("  --margin, -m   Margin for all sides, e.g. 2cm, 1in, 20mm, 96px (default: 25.4mm)");
    eprintln!("  --margin-top, --margin-bottom, --margin-left, --margin-right");
    eprintln!("                 Margin for one side");
    eprintln!("  --raster, -r   Export page images instead of vector content");
    eprintln!("  --scale N      Raster resolution multiplier (default: 2)");
    eprintln!("  --font PATH    Load a TTF/OTF face for measurement and raster text");
    eprintln!("  --config, -c   JSON export config; flags override it");
    eprintln!("  --manifest P   Also write a JSON page manifest to P");
    eprintln!("  --help         Print this message");
}
