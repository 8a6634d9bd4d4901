//! Coprocessor identity, used to select per-unit configuration.
//!
//! Each Raspberry Pi carries a sort-of-unique board serial. The serial picks
//! the role this process runs as; anything unrecognized runs as `Unknown`.
//! Don't put configuration values in here, only the serial binding.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::module::define;

/// Which physical unit (and so which role) this process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    // 2024 comp bot cameras
    Shooter,
    RightAmp,
    LeftAmp,
    GamePiece,
    // camera-bot cameras
    GlobalGamePiece,
    GlobalRight, // retired, hardware moved to CoralRight
    GlobalLeft,  // retired, hardware moved to SwerveRight
    // 2025 comp bot cameras
    SwerveRight,
    SwerveLeft,
    Funnel,
    CoralLeft,
    CoralRight,
    // for testing
    Dev,
    Dev2, // retired, hardware moved to CoralLeft
    DistTest,
    Flipped,
    Unknown,
}

impl Identity {
    /// Every identity, in declaration order.
    pub const ALL: [Identity; 17] = [
        Identity::Shooter,
        Identity::RightAmp,
        Identity::LeftAmp,
        Identity::GamePiece,
        Identity::GlobalGamePiece,
        Identity::GlobalRight,
        Identity::GlobalLeft,
        Identity::SwerveRight,
        Identity::SwerveLeft,
        Identity::Funnel,
        Identity::CoralLeft,
        Identity::CoralRight,
        Identity::Dev,
        Identity::Dev2,
        Identity::DistTest,
        Identity::Flipped,
        Identity::Unknown,
    ];

    /// The board serial bound to this identity, if any.
    pub fn serial(&self) -> Option<&'static str> {
        match self {
            Identity::Shooter => Some("10000000a7a892c0"),
            Identity::RightAmp => Some("10000000caeaae82"),
            Identity::LeftAmp => Some("100000004e0a1fb9"),
            Identity::GamePiece => Some("1000000013c9c96c"),
            Identity::GlobalGamePiece => Some("d44649628c20d4d4"),
            Identity::SwerveRight => Some("06ece53b019a5c2e"),
            Identity::SwerveLeft => Some("8132c256f63bbb4e"),
            Identity::Funnel => Some("1e5acbaa5a7f9d10"),
            Identity::CoralLeft => Some("8ddb2ed6c49a9bce"),
            Identity::CoralRight => Some("364f07fb090a3bf7"),
            Identity::Dev => Some("10000000a7c673d9"), // rpi4 used for development
            Identity::DistTest => Some("disttest"),
            Identity::Flipped => Some("flipme"), // example for per-identity config
            Identity::GlobalRight | Identity::GlobalLeft | Identity::Dev2 | Identity::Unknown => {
                None
            }
        }
    }

    /// Convert a board serial to an identity.
    ///
    /// Unmatched serials, including the empty one, map to `Unknown`.
    pub fn from_serial(serial: &str) -> Identity {
        Identity::ALL
            .iter()
            .copied()
            .find(|i| i.serial() == Some(serial))
            .unwrap_or(Identity::Unknown)
    }

    /// Upper-case name, as used in config tables and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Identity::Shooter => "SHOOTER",
            Identity::RightAmp => "RIGHTAMP",
            Identity::LeftAmp => "LEFTAMP",
            Identity::GamePiece => "GAME_PIECE",
            Identity::GlobalGamePiece => "GLOBAL_GAME_PIECE",
            Identity::GlobalRight => "GLOBAL_RIGHT",
            Identity::GlobalLeft => "GLOBAL_LEFT",
            Identity::SwerveRight => "SWERVE_RIGHT",
            Identity::SwerveLeft => "SWERVE_LEFT",
            Identity::Funnel => "FUNNEL",
            Identity::CoralLeft => "CORAL_LEFT",
            Identity::CoralRight => "CORAL_RIGHT",
            Identity::Dev => "DEV",
            Identity::Dev2 => "DEV2",
            Identity::DistTest => "DIST_TEST",
            Identity::Flipped => "FLIPPED",
            Identity::Unknown => "UNKNOWN",
        }
    }

    /// Key used in topic paths: the bound serial, else the lower-case name.
    ///
    /// The robot side looks cameras up by serial.
    pub fn key(&self) -> String {
        match self.serial() {
            Some(serial) => serial.to_owned(),
            None => self.name().to_lowercase(),
        }
    }

    /// Resolve the identity of this unit from the platform serial.
    ///
    /// The serial is read once per process; later calls return the same value.
    /// Never fails: a missing serial source resolves to `Unknown`.
    pub fn get() -> Identity {
        static IDENTITY: OnceLock<Identity> = OnceLock::new();
        *IDENTITY.get_or_init(|| {
            let serial = cpuinfo::read(define::system::CPUINFO_FILE);
            let identity = Identity::from_serial(&serial);
            log::info!("Coprocessor serial: {:?}", serial);
            log::info!("Coprocessor identity: {}", identity);
            identity
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::ALL
            .iter()
            .copied()
            .find(|i| i.name() == s)
            .ok_or_else(|| format!("no identity named {s}"))
    }
}

/// Board serial extraction.
pub mod cpuinfo {
    use std::fs;

    /// Read the serial from a cpuinfo-style file.
    ///
    /// Platforms without the file (anything but Linux) yield an empty serial.
    pub fn read(path: &str) -> String {
        match fs::read_to_string(path) {
            Ok(text) => parse(&text),
            Err(e) => {
                log::debug!("No serial source at {}: {}", path, e);
                String::new()
            }
        }
    }

    /// Pull the 16 serial digits out of the `Serial` line.
    ///
    /// The line looks like `Serial\t\t: 10000000a7a892c0`.
    pub fn parse(text: &str) -> String {
        text.lines()
            .find(|line| line.starts_with("Serial"))
            .map(|line| line.chars().skip(10).take(16).collect())
            .unwrap_or_default()
    }
}
