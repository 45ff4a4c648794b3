use std::{collections::BTreeSet, error::Error, fs};

use ramforge_libmap::library::{LibOptions, Library, PortKind, RamKind};

fn run() -> Result<(), Box<dyn Error>> {
    let mut lib_files: Vec<String> = vec![];
    let mut defines: Vec<String> = vec![];
    let mut no_auto_distributed = false;
    let mut no_auto_block = false;
    let mut no_auto_huge = false;
    let mut debug_geom = false;
    {
        let mut parser = argparse::ArgumentParser::new();
        parser.set_description("Parse, validate, and summarize RAM library descriptions.");
        parser.refer(&mut lib_files).add_option(
            &["-l", "--lib"],
            argparse::Collect,
            "Library file with RAM cell definitions (can be given more than once)",
        );
        parser.refer(&mut defines).add_option(
            &["-D", "--define"],
            argparse::Collect,
            "Enable a condition checked with `ifdef` in the library (can be given more than once)",
        );
        parser.refer(&mut no_auto_distributed).add_option(
            &["--no-auto-distributed"],
            argparse::StoreTrue,
            "Never select distributed RAM automatically",
        );
        parser.refer(&mut no_auto_block).add_option(
            &["--no-auto-block"],
            argparse::StoreTrue,
            "Never select block RAM automatically",
        );
        parser.refer(&mut no_auto_huge).add_option(
            &["--no-auto-huge"],
            argparse::StoreTrue,
            "Never select huge RAM automatically",
        );
        parser.refer(&mut debug_geom).add_option(
            &["--debug-geom"],
            argparse::StoreTrue,
            "Log every geometry evaluated during mapping",
        );
        parser.parse_args_or_exit();
    }

    let opts = LibOptions { no_auto_distributed, no_auto_block, no_auto_huge, debug_geom };
    let mut lib = Library::new(opts, BTreeSet::from_iter(defines));
    for file in &lib_files {
        let source = fs::read_to_string(file)?;
        ramforge_libmap::parse_library(&mut lib, file, &source)?;
    }
    lib.finish();

    for ram in &lib.ram_defs {
        let kind = match ram.kind {
            RamKind::Distributed => "distributed",
            RamKind::Block => "block",
            RamKind::Huge => "huge",
            _ => unreachable!(),
        };
        println!("ram {} {}", kind, ram.id);
        for dims in &ram.dims {
            println!(
                "  abits {} dbits {:?}{} cost {}",
                dims.val.abits,
                dims.val.dbits,
                if dims.val.tied { " tied" } else { "" },
                dims.val.cost
            );
        }
        for byte in &ram.byte {
            println!("  byte {}", byte.val);
        }
        for port in &ram.ports {
            let kind = match port.val.kind {
                PortKind::Ar => "ar",
                PortKind::Sr => "sr",
                PortKind::Sw => "sw",
                PortKind::Arsw => "arsw",
                PortKind::Srsw => "srsw",
            };
            println!("  port {} {}", kind, port.val.names.join(" "));
        }
        for style in &ram.style {
            println!("  style \"{}\"", style.val);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}
