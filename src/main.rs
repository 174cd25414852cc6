use clap::Parser;
use kernprune::cli::Cli;
use kernprune::consts::LOG_ENV;
use kernprune::kernel::Kernel;
use kernprune::prelude::*;
use kernprune::prune::RemovalPlan;
use kernprune::remove::RemovalReport;
use kernprune::Summary;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

fn setup_logs_and_install_panic_hook(debug: bool) -> Result<()> {
    color_eyre::install()?;
    let default = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let directives = (std::env::var(LOG_ENV))
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_default();
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default.into())
        .parse(directives)
        .wrap_err("Invalid log filter")?;

    // journald is optional: containers and chroots often lack it
    let journald = tracing_journald::layer().ok().map(|layer| {
        layer
            .with_syslog_identifier("kernprune".to_owned())
            .with_filter(LevelFilter::INFO)
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .pretty()
                .with_filter(filter),
        )
        .with(journald)
        .try_init()?;
    tracing::debug!("kernprune {version}", version = env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn print_kernels(kernels: &[Kernel]) {
    if kernels.is_empty() {
        println!("No kernels found.");
    }
    for kernel in kernels {
        println!("{kernel}");
        for file in &kernel.files {
            println!("  - {file}");
        }
    }
}

fn print_removal(plan: &RemovalPlan, report: &RemovalReport) {
    if plan.is_empty() {
        println!("No kernels to remove.");
        return;
    }
    let verb = if report.pretend {
        "Would remove"
    } else {
        "Removed"
    };
    for kernel in &plan.remove {
        println!("{verb} kernel {kernel}");
    }
    for path in &report.removed {
        println!("  - {}", path.display());
    }
    for path in &report.kept_nonempty {
        println!("Kept non-empty directory {}", path.display());
    }
    println!("{verb} {} files.", report.removed.len());
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logs_and_install_panic_hook(cli.debug)?;

    let cfg = kernprune::cfg::get_cfg()?;
    let settings = cli.into_settings(cfg);
    tracing::debug!(?settings, "Settings");

    match kernprune::run(&settings)? {
        Summary::Listed {
            kernels,
            json: true,
        } => println!("{}", serde_json::to_string_pretty(&kernels)?),
        Summary::Listed { kernels, .. } => print_kernels(&kernels),
        Summary::Pruned { plan, report } => print_removal(&plan, &report),
    }
    Ok(())
}
