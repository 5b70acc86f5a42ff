use anyhow::{Context, Result};
use clap::Parser;
use somenu::app::{self, MenuPopup};
use somenu::cli::Args;
use somenu::config::Config;
use somenu::menu::load_menu;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::from_args(&args)?;
    let root = load_menu(&config).context("failed to load the application menu")?;

    if args.dump {
        print!("{root}");
        return Ok(());
    }

    let native_options = eframe::NativeOptions {
        viewport: app::viewport(args.hotkey.is_some()),
        centered: true,
        ..Default::default()
    };

    let hotkey = args.hotkey.clone();
    eframe::run_native(
        "somenu",
        native_options,
        Box::new(move |cc| Box::new(MenuPopup::new(&cc.egui_ctx, root, &config, hotkey.as_deref()))),
    )
    .map_err(|err| anyhow::anyhow!("{err}"))
}
