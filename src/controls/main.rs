// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("asimov-camera-controls requires the 'std' feature");

use asimov_camera_control_module::{
    cli,
    shared::{CameraConfig, CameraError, DirectoryLibrary, LayoutVariant, ParameterKind, open_session},
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use serde_json::json;
use std::{error::Error as StdError, sync::Arc};

/// Prints the manual control ranges and current labels of a camera.
#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Device unique ID or name (default: the rear wide-angle camera)
    #[arg(long)]
    device: Option<String>,

    #[arg(long, value_enum, default_value = "standalone")]
    layout: Layout,

    #[arg(
        value_name = "FORMAT",
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text"
    )]
    output: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Jsonl,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Layout {
    Standalone,
    Embedded,
}

impl From<Layout> for LayoutVariant {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Standalone => LayoutVariant::Standalone,
            Layout::Embedded => LayoutVariant::Embedded,
        }
    }
}

pub fn main() -> Result<SysexitsError, Box<dyn StdError>> {
    asimov_module::dotenv().ok();
    let args = asimov_module::args_os()?;
    let options = Options::parse_from(args);

    if options.flags.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(EX_OK);
    }

    if options.flags.license {
        print!("{}", include_str!("../../UNLICENSE"));
        return Ok(EX_OK);
    }

    #[cfg(feature = "tracing")]
    asimov_module::init_tracing_subscriber(&options.flags).expect("failed to initialize logging");

    let exit_code = match run_controls(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_controls(options: &Options) -> Result<(), CameraError> {
    cli::info_user(&options.flags, "opening camera");

    let mut config = CameraConfig::for_layout(options.layout.into());
    if let Some(device) = &options.device {
        config = config.with_device(device.clone());
    }
    let library = Arc::new(DirectoryLibrary::new(std::env::temp_dir().join("asimov-camera")));
    let session = open_session(config, library)?;

    while let Ok(event) = session.events().try_recv() {
        cli::warn_user(&options.flags, &format!("{event:?}"));
    }

    let controller = session.controller();
    let settings = controller.settings();
    for (kind, setting) in ParameterKind::ALL.into_iter().zip(settings) {
        let device = controller.device().active_range(kind);
        let slider = controller.slider_range(kind);
        match options.output {
            OutputFormat::Text => {
                println!(
                    "{kind}: {} (slider {}..{}, device {}..{})",
                    setting.label(),
                    kind.format_value(slider.minimum),
                    kind.format_value(slider.maximum),
                    kind.format_value(device.minimum),
                    kind.format_value(device.maximum),
                );
            },
            OutputFormat::Jsonl => {
                println!(
                    "{}",
                    json!({
                        "parameter": kind.as_str(),
                        "value": setting.value,
                        "label": setting.label(),
                        "slider": [slider.minimum, slider.maximum],
                        "device": [device.minimum, device.maximum],
                    })
                );
            },
        }
    }

    if let Some(format) = session.active_format() {
        cli::info_user(
            &options.flags,
            &format!("active format {}x{}", format.width, format.height),
        );
    }

    Ok(())
}
