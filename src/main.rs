// GUI-subsystem binary on Windows: no console window is allocated.
#![windows_subsystem = "windows"]

use clap::Parser;
use eframe::egui;

use memefe::app::MemeFEApp;
use memefe::cli::LaunchArgs;
use memefe::settings::EditorSettings;
use memefe::{log_info, logger};

fn main() -> Result<(), eframe::Error> {
    let args = LaunchArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init();
    logger::set_verbose(args.verbose);

    // First launch: write the defaults so there is a file to edit.
    let settings_exist = EditorSettings::settings_path().is_some_and(|p| p.is_file());
    let mut settings = EditorSettings::load();
    if !settings_exist {
        settings.save();
    }
    args.apply(&mut settings);
    log_info!(
        "Canvas {}x{}, assets in {}",
        settings.canvas_width,
        settings.canvas_height,
        settings.asset_dir.display()
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_title("MemeFE"),
        ..Default::default()
    };

    let background = args.background.clone();
    eframe::run_native(
        "MemeFE",
        options,
        Box::new(move |cc| Box::new(MemeFEApp::new(cc, settings, background))),
    )
}
