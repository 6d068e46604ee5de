// This is free and unencumbered software released into the public domain.

mod completion;
pub use completion::*;

mod config;
pub use config::*;

mod controller;
pub use controller::*;

mod device;
pub use device::*;

mod driver;
pub use driver::*;

pub mod drivers {
    pub mod simulated;

    #[cfg(all(feature = "avf", any(target_os = "ios", target_os = "macos")))]
    pub mod avf;
}

mod error;
pub use error::*;

mod media;
pub use media::*;

mod open;
pub use open::*;

mod parameter;
pub use parameter::*;

mod range;
pub use range::*;

mod session;
pub use session::*;
