// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("asimov-camera-capture requires the 'std' feature");

use asimov_camera_control_module::{
    cli,
    shared::{
        CameraConfig, CameraError, CameraEvent, CaptureSession, DirectoryLibrary, LayoutVariant,
        RecordingToggle, open_session,
    },
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use std::{
    error::Error as StdError,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Opens a camera in manual mode, applies focus, ISO, and exposure, and
/// captures a photo or a video clip.
#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Device unique ID or name (default: the rear wide-angle camera)
    #[arg(long)]
    device: Option<String>,

    #[arg(long, value_enum, default_value = "standalone")]
    layout: Layout,

    /// Lens position in [0, 1]
    #[arg(long)]
    focus: Option<f64>,

    #[arg(long)]
    iso: Option<f64>,

    /// Exposure duration in milliseconds
    #[arg(long, value_name = "MS")]
    exposure: Option<f64>,

    /// Take a still photo
    #[arg(long)]
    photo: bool,

    /// Record a video clip for this many seconds
    #[arg(long, value_name = "SECONDS")]
    record: Option<f64>,

    /// Where finished media is saved
    #[arg(long, value_name = "DIR")]
    media_dir: Option<PathBuf>,
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

    let exit_code = match run_capture(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_capture(opts: &Options) -> Result<(), CameraError> {
    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit2 = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            quit2.store(true, Ordering::SeqCst);
        })
        .map_err(|e| CameraError::other(format!("{e}")))?;
    }

    let mut config = CameraConfig::for_layout(opts.layout.into());
    if let Some(device) = &opts.device {
        config = config.with_device(device.clone());
    }
    let media_dir = opts
        .media_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()));
    let library = Arc::new(DirectoryLibrary::new(media_dir));

    let mut session = open_session(config, library)?;
    session
        .controller()
        .add_label_sink(Arc::new(|kind, text| println!("{kind}: {text}")));

    let controller = session.controller();
    if let Some(focus) = opts.focus {
        controller.set_focus(focus)?;
    }
    if let Some(iso) = opts.iso {
        controller.set_iso(iso)?;
    }
    if let Some(ms) = opts.exposure {
        controller.set_exposure_duration(ms / 1000.0)?;
    }
    if opts.focus.is_none() && opts.iso.is_none() && opts.exposure.is_none() {
        session.publish_labels();
    }

    if !opts.photo && opts.record.is_none() {
        return Ok(());
    }

    session.start()?;
    wait_until_started(&session, opts)?;

    if opts.photo {
        let asset = session.capture_photo().wait()?;
        println!("saved {}: {}", asset.kind, asset.identifier);
    }

    if let Some(seconds) = opts.record {
        let RecordingToggle::Started { path, completion } = session.toggle_recording()? else {
            return Err(CameraError::AlreadyRecording);
        };
        cli::info_user(&opts.flags, &format!("recording to {}", path.display()));

        let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
        while Instant::now() < deadline && !quit.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
        }

        session.toggle_recording()?;
        let asset = completion.wait()?;
        println!("saved {}: {}", asset.kind, asset.identifier);
    }

    session.stop()
}

fn wait_until_started(session: &CaptureSession, opts: &Options) -> Result<(), CameraError> {
    loop {
        match session.events().recv_timeout(Duration::from_secs(10)) {
            Ok(CameraEvent::Started { .. }) => return Ok(()),
            Ok(CameraEvent::Error { error, .. }) => return Err(error),
            Ok(CameraEvent::Warning { message, .. }) => cli::warn_user(&opts.flags, &message),
            Ok(_) => {},
            Err(_) => return Err(CameraError::other("timed out waiting for the capture session")),
        }
    }
}
