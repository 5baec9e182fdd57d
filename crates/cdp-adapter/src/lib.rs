//! Browser driving boundary.
//!
//! The engine only talks to [`BrowserDriver`]; [`ChromiumDriver`] speaks CDP
//! to a local Chromium and [`MemoryDriver`] plays back a [`DomFixture`].

pub mod chromium;
pub mod config;
pub mod driver;
pub mod error;
pub mod memory;

pub use chromium::ChromiumDriver;
pub use config::{detect_chrome_executable, CdpConfig};
pub use driver::{BrowserDriver, ElementHandle, Interaction};
pub use error::{AdapterError, AdapterErrorKind};
pub use memory::{DomFixture, MemoryDriver, RecordedInteraction};
