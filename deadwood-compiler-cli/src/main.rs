use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueHint};
use deadwood_compiler::compiler::{Compiler, Config};

mod logger;

#[derive(Parser, Debug)]
#[command(name = "deadwood", about = "Removes dead bindings and statements from JavaScript.")]
struct Args {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    // 省略時は標準出力
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: log::LevelFilter,

    #[arg(long)]
    no_validate: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    log::set_logger(&logger::StderrLogger)
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
    log::set_max_level(args.log_level);

    let input = std::fs::read_to_string(&args.input)?;
    let config = Config {
        validate: !args.no_validate,
    };
    let output = Compiler::new(config).compile(&input)?;

    match &args.output {
        Some(path) => std::fs::File::create(path)?.write_all(output.as_bytes())?,
        None => std::io::stdout().write_all(output.as_bytes())?,
    }

    Ok(())
}
