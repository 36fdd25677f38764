//! Module directory
//!
//! Maps every module and channel to the IP address and port pair its
//! sockets use. A module receives on `input_port` and sends from
//! `output_port`; to reach module M on channel C a sender targets M's
//! input port for C.
//!
//! The directory is an explicit value shared through `Arc` by every channel
//! of a process. It can be the compiled-in table or loaded from TOML:
//!
//! ```toml
//! [[module]]
//! id = 2
//!
//! [[module.channel]]
//! name = "Event Channel"
//! ip = "127.0.0.2"
//! input_port = 15001
//! output_port = 16001
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Module, ModuleId};
use crate::{ModlinkError, Result};

/// Environment variable naming a directory file for [`ModuleDirectory::from_env`]
pub const DIRECTORY_ENV_VAR: &str = "MODLINK_DIRECTORY";

const BUILTIN_INPUT_BASE: u16 = 15000;
const BUILTIN_OUTPUT_BASE: u16 = 16000;
const BUILTIN_EVENT_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);
const BUILTIN_STATE_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 3);

// ----------------------------------------------------------------------------
// Channel Kind
// ----------------------------------------------------------------------------

/// The two channels every module exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Event,
    State,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Event, ChannelKind::State];

    /// Channel name as used in directory files and logs
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Event => "Event Channel",
            ChannelKind::State => "State Channel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Socket Parameters
// ----------------------------------------------------------------------------

/// Address and port pair of one module on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSocketParam {
    pub ip: IpAddr,
    pub input_port: u16,
    pub output_port: u16,
}

impl ChannelSocketParam {
    pub fn new(ip: IpAddr, input_port: u16, output_port: u16) -> Self {
        Self {
            ip,
            input_port,
            output_port,
        }
    }

    /// Where this module receives
    pub fn input_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.input_port)
    }

    /// Where this module sends from
    pub fn output_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.output_port)
    }
}

/// All channel endpoints of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub id: ModuleId,
    channels: HashMap<ChannelKind, ChannelSocketParam>,
}

impl ModuleConfig {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            channels: HashMap::new(),
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelSocketParam> {
        self.channels.get(&kind)
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelKind, &ChannelSocketParam)> {
        self.channels.iter().map(|(kind, param)| (*kind, param))
    }
}

// ----------------------------------------------------------------------------
// Directory
// ----------------------------------------------------------------------------

/// Lookup table from module and channel to socket parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDirectory {
    modules: HashMap<ModuleId, ModuleConfig>,
}

impl ModuleDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled-in address table for the nine well-known modules
    pub fn builtin() -> Self {
        let mut directory = Self::new();
        for (index, module) in Module::ALL.iter().enumerate() {
            let offset = index as u16;
            let input = BUILTIN_INPUT_BASE + offset;
            let output = BUILTIN_OUTPUT_BASE + offset;
            let entry = directory
                .modules
                .entry(module.id())
                .or_insert_with(|| ModuleConfig::new(module.id()));
            entry.channels.insert(
                ChannelKind::Event,
                ChannelSocketParam::new(BUILTIN_EVENT_IP.into(), input, output),
            );
            entry.channels.insert(
                ChannelKind::State,
                ChannelSocketParam::new(BUILTIN_STATE_IP.into(), input, output),
            );
        }
        directory
    }

    /// Parse a directory from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: DirectoryFile = toml::from_str(contents)?;
        let mut directory = Self::new();
        for module in file.modules {
            if directory.modules.contains_key(&module.id) {
                return Err(ModlinkError::bad_configuration(format!(
                    "module {} is listed twice",
                    module.id
                )));
            }
            directory
                .modules
                .insert(module.id, ModuleConfig::new(module.id));
            for channel in module.channels {
                let kind = ChannelKind::from_name(&channel.name).ok_or_else(|| {
                    ModlinkError::bad_configuration(format!(
                        "module {} has unknown channel '{}'",
                        module.id, channel.name
                    ))
                })?;
                directory.insert(
                    module.id,
                    kind,
                    ChannelSocketParam::new(channel.ip, channel.input_port, channel.output_port),
                )?;
            }
        }
        Ok(directory)
    }

    /// Load a directory from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Load the file named by `MODLINK_DIRECTORY`, or fall back to [`Self::builtin`]
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(DIRECTORY_ENV_VAR) {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Register one channel endpoint of a module
    pub fn insert(
        &mut self,
        module: ModuleId,
        kind: ChannelKind,
        param: ChannelSocketParam,
    ) -> Result<()> {
        let entry = self
            .modules
            .entry(module)
            .or_insert_with(|| ModuleConfig::new(module));
        if entry.channels.contains_key(&kind) {
            return Err(ModlinkError::bad_configuration(format!(
                "module {} already has a {}",
                module, kind
            )));
        }
        entry.channels.insert(kind, param);
        Ok(())
    }

    /// Builder form of [`Self::insert`]
    pub fn with_channel(
        mut self,
        module: ModuleId,
        kind: ChannelKind,
        param: ChannelSocketParam,
    ) -> Result<Self> {
        self.insert(module, kind, param)?;
        Ok(self)
    }

    /// Socket parameters of `module` on `kind`
    pub fn lookup(&self, module: ModuleId, kind: ChannelKind) -> Result<ChannelSocketParam> {
        self.modules
            .get(&module)
            .and_then(|config| config.channel(kind))
            .copied()
            .ok_or_else(|| {
                ModlinkError::bad_configuration(format!(
                    "no {} configured for module {}",
                    kind, module
                ))
            })
    }

    pub fn get(&self, module: ModuleId) -> Option<&ModuleConfig> {
        self.modules.get(&module)
    }

    pub fn contains(&self, module: ModuleId) -> bool {
        self.modules.contains_key(&module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleConfig> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// ----------------------------------------------------------------------------
// File Format
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default, rename = "module")]
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    id: ModuleId,
    #[serde(default, rename = "channel")]
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    name: String,
    ip: IpAddr,
    input_port: u16,
    output_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let directory = ModuleDirectory::builtin();
        assert_eq!(directory.len(), 9);

        let motion = directory
            .lookup(Module::MotionControl.id(), ChannelKind::Event)
            .unwrap();
        assert_eq!(motion.ip, IpAddr::from([127, 0, 0, 2]));
        assert_eq!(motion.input_port, 15001);
        assert_eq!(motion.output_port, 16001);

        let ultrasound = directory
            .lookup(Module::UltrasoundInput.id(), ChannelKind::State)
            .unwrap();
        assert_eq!(ultrasound.ip, IpAddr::from([127, 0, 0, 3]));
        assert_eq!(ultrasound.input_port, 15008);
        assert_eq!(ultrasound.output_port, 16008);
    }

    #[test]
    fn test_unknown_module_is_bad_configuration() {
        let directory = ModuleDirectory::builtin();
        let err = directory
            .lookup(ModuleId::new(42), ChannelKind::Event)
            .unwrap_err();
        assert!(matches!(err, ModlinkError::BadConfiguration { .. }));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let param = ChannelSocketParam::new(IpAddr::from([127, 0, 0, 1]), 1, 2);
        let mut directory = ModuleDirectory::new();
        directory
            .insert(ModuleId::new(1), ChannelKind::Event, param)
            .unwrap();
        assert!(directory
            .insert(ModuleId::new(1), ChannelKind::Event, param)
            .is_err());
        assert!(directory
            .insert(ModuleId::new(1), ChannelKind::State, param)
            .is_ok());
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(ChannelKind::from_name("Event Channel"), Some(ChannelKind::Event));
        assert_eq!(ChannelKind::from_name("State Channel"), Some(ChannelKind::State));
        assert_eq!(ChannelKind::from_name("Video Channel"), None);
    }
}
