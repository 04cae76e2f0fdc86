use clap::Parser;
use gomodfetch::{cli::args::CliArgs, Gomodfetch};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    let mut builder = Gomodfetch::builder()
        .root(&cli_args.dir)
        .input_file_name(&cli_args.infile)
        .output_file_name(&cli_args.outfile)
        .keep_going(cli_args.keep_going);
    if let Some(jobs) = cli_args.jobs {
        builder = builder.jobs(jobs);
    }
    for (key, value) in cli_args.go_env.iter() {
        builder = builder.go_env(key, value);
    }

    let gomodfetch = builder.try_build()?;
    gomodfetch.lock(cli_args.lock_mode())?;
    Ok(())
}
