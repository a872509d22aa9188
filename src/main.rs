use std::path::PathBuf;

use clap::Parser;
use gallery_ngin::{config::GalleryConfig, device::DeviceClass, flow};

#[derive(Parser, Debug, Clone)]
#[command(name = "gallery")]
#[command(about = "Walk through a 3D gallery building", long_about = None)]
struct Cli {
    /// JSON gallery configuration; defaults apply to everything it leaves out
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use the virtual-joystick camera regardless of the detected device
    #[arg(long)]
    mobile: bool,

    /// Directory the building is loaded from
    #[arg(long, value_name = "DIR")]
    assets: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GalleryConfig::load(path)?,
        None => GalleryConfig::default(),
    };
    if let Some(mut root) = cli.assets {
        if !root.ends_with('/') {
            root.push('/');
        }
        config.building.root_url = root;
    }

    flow::run(config, cli.mobile.then_some(DeviceClass::Mobile))
}
