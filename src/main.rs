// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use eframe::egui;
use log::info;

use sigview::config::ViewerConfig;
use sigview::gui::SigviewApp;

/// Scrolling multi-channel signal viewer
#[derive(Parser, Debug)]
#[command(name = "sigview", version, about)]
struct Args {
    /// JSON viewer configuration; defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Recording to open (.csv, .tsv, .txt or .npy); a demo montage otherwise
    #[arg(value_name = "DATA")]
    data: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    info!("starting with {:?}", args.data);

    let app = SigviewApp::new(config, args.data).context("failed to initialise viewer")?;
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 800.0])
        .with_min_inner_size([900.0, 600.0])
        .with_title("sigview");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native("sigview", options, Box::new(move |_cc| Box::new(app)))
        .map_err(|e| anyhow!("viewer window failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn config_flag_and_data_file() {
        let args = Args::try_parse_from(["sigview", "-c", "viewer.json", "rec.npy"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("viewer.json")));
        assert_eq!(args.data, Some(PathBuf::from("rec.npy")));

        let args = Args::try_parse_from(["sigview"]).unwrap();
        assert!(args.config.is_none() && args.data.is_none());
        assert!(Args::try_parse_from(["sigview", "--bogus"]).is_err());
    }
}
