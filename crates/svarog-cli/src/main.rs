use std::{env, fs, process::ExitCode};

use svarog::{Compilation, CompilationOptions, StderrTracer, parse_libmap};

const USAGE: &str = "usage: svarog [-L lib1,lib2,...] [--libmap FILE] [--top NAME[:config]]... \
[--dump-json] [--trace] file.sv...";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut options = CompilationOptions::default();
    let mut search_order: Vec<String> = Vec::new();
    let mut libmap_path: Option<String> = None;
    let mut dump_json = false;
    let mut trace = false;
    let mut files: Vec<String> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-L" => {
                let Some(libs) = iter.next() else {
                    eprintln!("error: -L requires a comma-separated library list");
                    return ExitCode::FAILURE;
                };
                search_order.extend(libs.split(',').map(str::to_owned));
            }
            "--libmap" => {
                let Some(path) = iter.next() else {
                    eprintln!("error: --libmap requires a file path");
                    return ExitCode::FAILURE;
                };
                libmap_path = Some(path);
            }
            "--top" => {
                let Some(top) = iter.next() else {
                    eprintln!("error: --top requires a module name");
                    return ExitCode::FAILURE;
                };
                options.tops.push(top);
            }
            "--dump-json" => dump_json = true,
            "--trace" => trace = true,
            "--allow-toplevel-iface-ports" => options.allow_toplevel_iface_ports = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown option `{other}`\n{USAGE}");
                return ExitCode::FAILURE;
            }
            _ => files.push(arg),
        }
    }

    if files.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    let mut compilation = Compilation::new(options);
    if trace {
        compilation.set_tracer(Box::new(StderrTracer));
    }

    // the library map routes matching files into named libraries; everything
    // else lands in the default library
    let mut libmap_entries = Vec::new();
    if let Some(path) = libmap_path {
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("error: cannot read {path}: {err}");
                return ExitCode::FAILURE;
            }
        };
        match parse_libmap(&text) {
            Ok(entries) => libmap_entries = entries,
            Err(err) => {
                eprintln!("error: {path}: {err}");
                return ExitCode::FAILURE;
            }
        }
        // registration order defines priority
        for entry in &libmap_entries {
            compilation.register_library(&entry.name);
        }
    }

    if !search_order.is_empty() {
        let refs: Vec<&str> = search_order.iter().map(String::as_str).collect();
        compilation.set_search_order(&refs);
    }

    for file in &files {
        let text = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("error: cannot read {file}: {err}");
                return ExitCode::FAILURE;
            }
        };
        match library_for_file(file, &libmap_entries) {
            Some(library) => compilation.add_source_to_library(&library, file, &text),
            None => compilation.add_source(file, &text),
        }
    }

    compilation.elaborate();

    let rendered = compilation.render_diagnostics();
    if !rendered.is_empty() {
        eprint!("{rendered}");
    }
    if dump_json {
        println!("{}", compilation.dump_json_pretty());
    }

    if compilation.diagnostics().has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Matches a source file against libmap patterns by suffix; full glob
/// matching is out of scope for the driver.
fn library_for_file(file: &str, entries: &[svarog::LibMapEntry]) -> Option<String> {
    for entry in entries {
        for pattern in &entry.patterns {
            let suffix = pattern.rsplit('/').next().unwrap_or(pattern);
            let matches = if let Some(stem) = suffix.strip_prefix('*') {
                file.ends_with(stem)
            } else {
                file == pattern || file.ends_with(&format!("/{suffix}"))
            };
            if matches {
                return Some(entry.name.clone());
            }
        }
    }
    None
}
