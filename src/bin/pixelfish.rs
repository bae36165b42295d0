//! Command-line pixel conversion.
//!
//! ```text
//! pixelfish --from "R'G'B' u8" --to "CIE Lab float" 255 0 0
//! ```
//!
//! Reads one pixel's component values according to the source format's
//! component types, converts it, and prints the destination components.
//!
//! Exit codes: 0 ok, 1 unknown format, 2 component count mismatch,
//! 3 value parse error, 4 unsupported input component type,
//! 5 unsupported output component type.

use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use pixelfish::Endpoint;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    pixelfish::init();
    let code = run(&env::args().skip(1).collect::<Vec<_>>());
    pixelfish::exit();
    ExitCode::from(code)
}

fn run(args: &[String]) -> u8 {
    let mut from = "R'G'B' float".to_string();
    let mut to = "R'G'B' float".to_string();

    // First pass: source and destination formats, in any argument order.
    let mut set_from = false;
    let mut set_to = false;
    for arg in args {
        if set_from {
            from = arg.clone();
            set_from = false;
        } else if set_to {
            to = arg.clone();
            set_to = false;
        } else if arg == "--from" || arg == "-f" {
            set_from = true;
        } else if arg == "--to" || arg == "-t" {
            set_to = true;
        }
    }
    for name in [&from, &to] {
        if !pixelfish::format_exists(name) {
            eprintln!("pixelfish: unknown format: {name}");
            return 1;
        }
    }

    let from_fmt = pixelfish::format(&from).expect("checked above");
    let to_fmt = pixelfish::format(&to).expect("checked above");
    let n_components = pixelfish::format_n_components(from_fmt).expect("initialized");
    let src_bpp = pixelfish::format_bytes_per_pixel(from_fmt).expect("initialized");
    let dst_bpp = pixelfish::format_bytes_per_pixel(to_fmt).expect("initialized");

    // Second pass: the component values themselves.
    let mut source = vec![0u8; src_bpp];
    let mut at = 0usize;
    let mut c = 0usize;
    let mut skip_value = false;
    for arg in args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--from" || arg == "-f" || arg == "--to" || arg == "-t" {
            skip_value = true;
            continue;
        }
        if c >= n_components {
            eprintln!("pixelfish: unexpected argument: {arg}");
            return 2;
        }
        let ty = pixelfish::format_type(from_fmt, c).expect("component in range");
        let ty_name = pixelfish::get_name(Endpoint::Type(ty)).expect("initialized");
        match ty_name.as_str() {
            "float" => match arg.parse::<f32>() {
                Ok(v) => {
                    source[at..at + 4].copy_from_slice(&v.to_ne_bytes());
                    at += 4;
                }
                Err(_) => return parse_failure(c, &ty_name, arg),
            },
            "u8" => match arg.parse::<u8>() {
                Ok(v) => {
                    source[at] = v;
                    at += 1;
                }
                Err(_) => return parse_failure(c, &ty_name, arg),
            },
            "u16" => match arg.parse::<u16>() {
                Ok(v) => {
                    source[at..at + 2].copy_from_slice(&v.to_ne_bytes());
                    at += 2;
                }
                Err(_) => return parse_failure(c, &ty_name, arg),
            },
            "u32" => match arg.parse::<u32>() {
                Ok(v) => {
                    source[at..at + 4].copy_from_slice(&v.to_ne_bytes());
                    at += 4;
                }
                Err(_) => return parse_failure(c, &ty_name, arg),
            },
            other => {
                eprintln!("pixelfish: unsupported type '{other}' of component {c}: {arg}");
                return 4;
            }
        }
        c += 1;
    }
    if c != n_components {
        eprintln!("pixelfish: {n_components} components expected, {c} components were passed");
        return 2;
    }

    let fish = match pixelfish::fish(&from, &to) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("pixelfish: {e}");
            return 1;
        }
    };
    let mut dest = vec![0u8; dst_bpp];
    if let Err(e) = pixelfish::process(&fish, &source, &mut dest, 1) {
        eprintln!("pixelfish: {e}");
        return 1;
    }

    println!("Conversion as \"{to}\":");
    let out_components = pixelfish::format_n_components(to_fmt).expect("initialized");
    let mut at = 0usize;
    for c in 0..out_components {
        let ty = pixelfish::format_type(to_fmt, c).expect("component in range");
        let ty_name = pixelfish::get_name(Endpoint::Type(ty)).expect("initialized");
        match ty_name.as_str() {
            "float" => {
                let v = f32::from_ne_bytes(dest[at..at + 4].try_into().expect("sized buffer"));
                at += 4;
                println!("- {v:.6}");
            }
            "u8" => {
                println!("- {}", dest[at]);
                at += 1;
            }
            "u16" => {
                let v = u16::from_ne_bytes(dest[at..at + 2].try_into().expect("sized buffer"));
                at += 2;
                println!("- {v}");
            }
            "u32" => {
                let v = u32::from_ne_bytes(dest[at..at + 4].try_into().expect("sized buffer"));
                at += 4;
                println!("- {v}");
            }
            other => {
                eprintln!("pixelfish: unsupported type '{other}' of returned component {c}");
                return 5;
            }
        }
    }
    0
}

fn parse_failure(component: usize, ty: &str, value: &str) -> u8 {
    eprintln!(
        "pixelfish: expected type of component {component} is '{ty}', invalid value: {value}"
    );
    3
}
