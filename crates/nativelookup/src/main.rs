use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use nativelookup_core::error::LookupError;
use nativelookup_core::symbols::demangle::display_name;
use nativelookup_core::{Host, LookupConfig, ModuleRegistry, NativeLibrary, SymbolKind};
use nativelookup_utils::{
    init_logging_to_file, init_logging_with_format, init_logging_with_level, LogFormat, LogLevel, LoggingError,
};
use tracing::info;

/// Resolve symbols of native modules loaded in this process.
#[derive(Parser, Debug)]
#[command(name = "nativelookup")]
#[command(version)]
#[command(about = "Resolve symbols of native modules and cache their offsets", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    /// Shared library to load before running the command (repeatable)
    #[arg(long, global = true, value_name = "PATH")]
    load: Vec<PathBuf>,

    /// Root of the offset cache and debug-info store (default: NATIVELOOKUP_CACHE_DIR or ~/.nativelookup)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the offset cache
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    /// Log level (default: RUST_LOG, or warn)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format: pretty or json
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List loaded modules
    Modules
    {
        /// Only show modules whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show a module's build identity and cache file
    Identity
    {
        /// Module file name (case-insensitive)
        module: String,
    },
    /// Resolve symbols, printing offset and absolute address
    Resolve
    {
        /// Module file name (case-insensitive)
        module: String,
        /// Symbol names
        #[arg(required = true)]
        symbols: Vec<String>,
        /// Symbol kind (default: export, then public symbol)
        #[arg(long)]
        kind: Option<SymbolKind>,
        /// Extra symbol server, searched after the configured ones (repeatable)
        #[arg(long = "server", value_name = "URL")]
        servers: Vec<String>,
    },
    /// Print the module's full symbol table
    Dump
    {
        /// Module file name (case-insensitive)
        module: String,
        /// Only print symbols of this kind
        #[arg(long)]
        kind: Option<SymbolKind>,
        /// Only print symbols whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main()
{
    let cli = Cli::parse();

    if let Err(e) = init_cli_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_cli_logging(cli: &Cli) -> Result<(), LoggingError>
{
    // Quiet by default: command output goes to stdout, logs to stderr
    let level = cli
        .log_level
        .or_else(|| std::env::var_os("RUST_LOG").is_none().then_some(LogLevel::Warn));

    match (&cli.log_file, level) {
        (Some(path), level) => init_logging_to_file(Some(path.clone()), level, cli.log_format).map(|_| ()),
        (None, Some(level)) => init_logging_with_level(level, cli.log_format),
        (None, None) => init_logging_with_format(cli.log_format),
    }
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>>
{
    for path in &cli.load {
        load_library(path)?;
    }

    let mut config = match &cli.cache_dir {
        Some(dir) => LookupConfig::new(dir),
        None => LookupConfig::from_env(),
    };
    config.persist = config.persist && !cli.no_cache;
    if let Commands::Resolve { servers, .. } = &cli.command {
        config.symbol_servers.extend(servers.iter().cloned());
    }
    if config.persist {
        config.ensure_directories()?;
    }

    let host = Host::native()?;
    match cli.command {
        Commands::Modules { filter } => {
            let modules = host.modules.loaded_modules()?;
            for module in modules
                .iter()
                .filter(|module| filter.as_deref().map_or(true, |text| module.name.contains(text)))
            {
                println!(
                    "{}  {:>10}  {:<32}  {}",
                    module.base,
                    format!("{:#x}", module.size),
                    module.name,
                    module.path.display()
                );
            }
            Ok(())
        }
        Commands::Identity { module } => {
            let registry = ModuleRegistry::new(host, config);
            let library = find_library(&registry, &module)?;
            print_identity(&library);
            Ok(())
        }
        Commands::Resolve {
            module,
            symbols,
            kind,
            servers: _,
        } => {
            let registry = ModuleRegistry::new(host, config);
            let library = find_library(&registry, &module)?;
            for name in &symbols {
                let resolved = match kind {
                    Some(kind) => library.symbol_offset(kind, name).map(|offset| (kind, offset)),
                    None => library
                        .exported_function_offset(name)
                        .map(|offset| (SymbolKind::Export, offset))
                        .or_else(|| {
                            library
                                .symbol_offset(SymbolKind::PublicSymbol, name)
                                .map(|offset| (SymbolKind::PublicSymbol, offset))
                        }),
                };
                match resolved {
                    Some((kind, offset)) => println!(
                        "{name}\t{kind}\t{}\t{}",
                        format_offset(offset),
                        library.base_address().with_offset(offset)
                    ),
                    None => match library.last_error() {
                        Some(code) => println!("{name}\tnot found (os error {code})"),
                        None => println!("{name}\tnot found"),
                    },
                }
            }
            Ok(())
        }
        Commands::Dump { module, kind, filter } => {
            let registry = ModuleRegistry::new(host, config);
            let library = find_library(&registry, &module)?;
            let table = library.symbol_table().ok_or_else(|| LookupError::DebugInfoUnavailable {
                module: library.name().to_string(),
                code: library.last_error(),
            })?;

            let mut rows: Vec<(SymbolKind, &str, i64)> = table
                .iter()
                .filter(|(symbol_kind, _, _)| kind.map_or(true, |wanted| wanted == *symbol_kind))
                .filter(|(_, name, _)| filter.as_deref().map_or(true, |text| name.contains(text)))
                .collect();
            rows.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

            for (symbol_kind, name, offset) in &rows {
                println!("{}\t{:<8}\t{}", format_offset(*offset), symbol_kind.label(), display_name(name));
            }
            info!(module = %library.name(), symbols = rows.len(), "dumped symbol table");
            Ok(())
        }
    }
}

fn find_library(
    registry: &ModuleRegistry,
    name: &str,
) -> Result<std::sync::Arc<NativeLibrary>, LookupError>
{
    registry
        .find_by_name(name)?
        .ok_or_else(|| LookupError::ModuleNotFound(name.to_string()))
}

fn print_identity(library: &NativeLibrary)
{
    println!("Module:      {}", library.name());
    println!("Path:        {}", library.module().path.display());
    println!("Base:        {}", library.base_address());
    match library.identity() {
        Some(identity) => println!("Signature:   {}", identity.signature),
        None => println!("Signature:   (none)"),
    }
    match library.cache_file_path() {
        Some(path) => println!("Cache file:  {}", path.display()),
        None => println!("Cache file:  (disabled)"),
    }
    println!("Cached:      {} entries", library.cache_snapshot().len());
    println!("Debug info:  {}", library.debug_info_state());
    println!("Search path: {}", library.search_path());
}

/// `0x1f40` or `-0x40`
fn format_offset(offset: i64) -> String
{
    if offset < 0 {
        format!("-{:#x}", offset.unsigned_abs())
    } else {
        format!("{:#x}", offset)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn load_library(path: &std::path::Path) -> Result<(), LookupError>
{
    nativelookup_core::platform::load_library(path)?;
    info!(path = %path.display(), "loaded library");
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn load_library(path: &std::path::Path) -> Result<(), LookupError>
{
    Err(LookupError::InvalidArgument(format!(
        "--load is not supported on this platform: {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve()
    {
        let cli = Cli::try_parse_from([
            "nativelookup",
            "resolve",
            "UnityPlayer.dll",
            "PlayerLoop",
            "Bar",
            "--kind",
            "function",
            "--server",
            "https://symbolserver.unity3d.com/",
            "--no-cache",
        ])
        .unwrap();

        assert!(cli.no_cache);
        match cli.command {
            Commands::Resolve {
                module,
                symbols,
                kind,
                servers,
            } => {
                assert_eq!(module, "UnityPlayer.dll");
                assert_eq!(symbols, vec!["PlayerLoop".to_string(), "Bar".to_string()]);
                assert_eq!(kind, Some(SymbolKind::Function));
                assert_eq!(servers, vec!["https://symbolserver.unity3d.com/".to_string()]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_resolve_requires_symbol()
    {
        assert!(Cli::try_parse_from(["nativelookup", "resolve", "libc.so.6"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand()
    {
        let cli = Cli::try_parse_from([
            "nativelookup",
            "modules",
            "--filter",
            "libc",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--load",
            "/tmp/libfoo.so",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.load, vec![PathBuf::from("/tmp/libfoo.so")]);
    }

    #[test]
    fn test_format_offset()
    {
        assert_eq!(format_offset(0x523410), "0x523410");
        assert_eq!(format_offset(-0x40), "-0x40");
    }
}
