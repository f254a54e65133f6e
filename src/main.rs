use std::path::PathBuf;
use std::time;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use log::{info, warn};

use crate::generate::context::BindingContext;

mod config;
mod cxx;
mod generate;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// The C++ header files to generate bindings for
    #[clap(value_parser, required = true, value_name = "HEADER")]
    headers: Vec<PathBuf>,

    /// A JSON configuration file; may be given several times
    #[clap(short = 'c', long = "config-file", value_parser, value_name = "PATH")]
    config_files: Vec<PathBuf>,

    /// Directory the generated package tree is written to
    #[clap(short, long, value_parser, value_name = "DIR", default_value = ".")]
    output: PathBuf,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli: Cli = Cli::parse();
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if cli.config_files.is_empty() {
        warn!("no configuration files given");
    }
    let configs = cli
        .config_files
        .iter()
        .map(|path| config::load_config_file(path))
        .collect::<color_eyre::Result<Vec<_>>>()?;
    let clang_args = config::collect_clang_args(&configs);

    let started = time::Instant::now();
    info!("parsing {} header(s)", cli.headers.len());
    let ast = parse_headers(&cli.headers, &clang_args)?;
    info!("parsed in {}ms", started.elapsed().as_millis());

    let mut ctx = BindingContext::new(&ast);
    generate::walker::walk(&mut ctx);
    generate::walker::restrict_to_files(&mut ctx, &cli.headers);
    info!("wrapped {} declarations", ctx.wrapped_decl_count());

    config::apply_configuration(&mut ctx, &configs)?;

    let translated = generate::dlang::translate::populate(&mut ctx)?;
    generate::dlang::output::produce_output(&translated.dast, &translated.root, &cli.output)
        .wrap_err("failed to write the generated bindings")?;
    Ok(())
}

#[cfg(feature = "libclang")]
fn parse_headers(headers: &[PathBuf], clang_args: &[String]) -> color_eyre::Result<cxx::CxxAst> {
    cxx::frontend::parse_headers(headers, clang_args)
}

#[cfg(not(feature = "libclang"))]
fn parse_headers(_headers: &[PathBuf], _clang_args: &[String]) -> color_eyre::Result<cxx::CxxAst> {
    color_eyre::eyre::bail!(
        "this build has no C++ frontend; rebuild with `--features libclang` to parse headers"
    )
}
