mod cli;
mod config;
mod demo;
mod logging;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("executor error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let mut config = config::load(args.config.as_deref())?;
    if let Some(tasks) = args.tasks {
        config.demo.tasks = tasks;
    }
    config.validate()?;

    let snapshot = demo::run(config).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
