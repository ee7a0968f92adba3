// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! vidtrack - video motion tracking
//!
//! A desktop application for marking object positions across video frames
//! and converting them into physical-unit motion data.

mod app;
mod ui;

use anyhow::Result;
use app::VidtrackApp;
use vidtrack::config::Settings;

fn main() -> Result<()> {
    env_logger::init();

    let settings = Settings::from_env()?;
    let app = VidtrackApp::new(settings)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 600.0])
            .with_title("vidtrack"),
        ..Default::default()
    };

    eframe::run_native("vidtrack", options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow::anyhow!("Application error: {}", e))?;

    Ok(())
}
