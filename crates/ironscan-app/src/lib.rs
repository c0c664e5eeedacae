#![doc = include_str!("../README.md")]
#![doc(html_logo_url = "https://cdnweb.devolutions.net/images/projects/devolutions/logos/devolutions-icon-shadow.svg")]

#[macro_use]
extern crate tracing;

mod callback;
mod library;
mod manager;
pub mod memory;
mod signal;
mod source;
mod transition;
mod wait;

#[cfg(windows)]
mod window;

pub use ironscan_twain as twain;

pub use self::callback::CallbackRegistry;
pub use self::library::{DsmLibrary, LibraryError, NativeDsmLibrary};
pub use self::manager::{LoadError, Manager};
pub use self::memory::{MemoryHooks, NativeHandle, OwnedMemory};
pub use self::signal::ReadySignal;
pub use self::source::Source;
pub use self::wait::{EventPump, CALLBACK_REQUIRED};

#[cfg(windows)]
pub use self::wait::Win32EventPump;
