//! Surface configuration
//!
//! Loaded from YAML at startup; every field has a default so a partial (or
//! missing) file still yields a usable surface.
//!
//! ```yaml
//! client_name: detent
//! osc_port: 6693
//! backend: ring
//! expander_interrupts: true
//! encoders:
//!   - slot: 0
//!     pin_a: 100
//!     pin_b: 101
//!     midi_chan: 0
//!     midi_ctrl: 74
//!     max_value: 127
//! switches:
//!   - slot: 0
//!     pin: 104
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::encoder::EncoderSetup;
use crate::pool::{MAX_ENCODERS, MAX_SWITCHES};
use crate::queue::EVENT_QUEUE_CAPACITY;
use crate::switch::SwitchSetup;

/// Which MIDI transport publishes encoder values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MidiBackendKind {
    /// Outbound ring drained by the JACK process callback
    #[default]
    Ring,
    /// Direct writes to a sequencer output port
    Sequencer,
}

/// One configured encoder slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSlotConfig {
    pub slot: usize,
    #[serde(flatten)]
    pub setup: EncoderSetup,
}

/// One configured switch slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchSlotConfig {
    pub slot: usize,
    pub pin: u32,
}

impl SwitchSlotConfig {
    pub fn setup(&self) -> SwitchSetup {
        SwitchSetup { pin: self.pin }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Name of the JACK client / sequencer client
    pub client_name: String,
    /// Local UDP port OSC messages go to; 0 disables OSC
    pub osc_port: u16,
    pub backend: MidiBackendKind,
    /// Substring of the output port name (sequencer backend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Substring of the input port name (sequencer backend, optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    /// Expander lines interrupt through banks A/B instead of being polled
    pub expander_interrupts: bool,
    /// Switch poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Inbound event queue size
    pub queue_capacity: usize,
    pub max_encoders: usize,
    pub max_switches: usize,
    pub encoders: Vec<EncoderSlotConfig>,
    pub switches: Vec<SwitchSlotConfig>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            client_name: "detent".to_string(),
            osc_port: 0,
            backend: MidiBackendKind::Ring,
            output_port: None,
            input_port: None,
            expander_interrupts: false,
            poll_interval_ms: 10,
            queue_capacity: EVENT_QUEUE_CAPACITY,
            max_encoders: MAX_ENCODERS,
            max_switches: MAX_SWITCHES,
            encoders: Vec::new(),
            switches: Vec::new(),
        }
    }
}

impl SurfaceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// OSC target port, if enabled
    pub fn osc_port(&self) -> Option<u16> {
        (self.osc_port != 0).then_some(self.osc_port)
    }
}

/// `<config dir>/detent/surface.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("detent")
        .join("surface.yaml")
}

/// Read the surface layout from a YAML file
///
/// A missing file yields defaults. An unreadable or invalid file is logged
/// and also yields defaults, so the daemon still comes up with no slots.
pub fn load_config(path: &Path) -> SurfaceConfig {
    if !path.exists() {
        log::info!("Surface config: {:?} not found, starting with no slots", path);
        return SurfaceConfig::default();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|contents| {
            serde_yaml::from_str::<SurfaceConfig>(&contents).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(config) => {
            log::info!(
                "Surface config: {} encoder slot(s), {} switch slot(s), {:?} MIDI backend from {:?}",
                config.encoders.len(),
                config.switches.len(),
                config.backend,
                path
            );
            config
        }
        Err(e) => {
            log::warn!("Surface config: ignoring {:?} ({}), starting with no slots", path, e);
            SurfaceConfig::default()
        }
    }
}

/// Write the surface layout as YAML, creating parent directories
pub fn save_config(config: &SurfaceConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create surface config directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Cannot encode surface layout")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Cannot write surface config {:?}", path))?;

    log::info!(
        "Surface config: wrote {} encoder / {} switch slot(s) to {:?}",
        config.encoders.len(),
        config.switches.len(),
        path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = load_config(Path::new("/nonexistent/detent/surface.yaml"));
        assert_eq!(config, SurfaceConfig::default());
        assert_eq!(config.osc_port(), None);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
osc_port: 6693
backend: sequencer
encoders:
  - slot: 1
    pin_a: 100
    pin_b: 101
    midi_ctrl: 74
    max_value: 127
switches:
  - slot: 0
    pin: 104
"#;
        let config: SurfaceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.osc_port(), Some(6693));
        assert_eq!(config.backend, MidiBackendKind::Sequencer);
        assert_eq!(config.client_name, "detent");
        assert_eq!(config.queue_capacity, EVENT_QUEUE_CAPACITY);

        let enc = &config.encoders[0];
        assert_eq!(enc.slot, 1);
        assert_eq!(enc.setup.midi_ctrl, 74);
        assert_eq!(enc.setup.step, 0);
        assert_eq!(enc.setup.osc_path, None);
        assert_eq!(config.switches[0].setup(), SwitchSetup { pin: 104 });
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface.yaml");
        std::fs::write(&path, "encoders: [this is not a slot").unwrap();
        assert_eq!(load_config(&path), SurfaceConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("surface.yaml");

        let mut config = SurfaceConfig::default();
        config.osc_port = 9000;
        config.switches.push(SwitchSlotConfig { slot: 3, pin: 22 });
        config.encoders.push(EncoderSlotConfig {
            slot: 0,
            setup: EncoderSetup {
                pin_a: 5,
                pin_b: 6,
                midi_chan: 1,
                midi_ctrl: 0,
                osc_path: Some("/cutoff".to_string()),
                value: 64,
                max_value: 127,
                step: 0,
            },
        });

        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path), config);
    }

    #[test]
    fn test_default_path_ends_with_surface_yaml() {
        let path = default_config_path();
        assert!(path.ends_with("detent/surface.yaml"));
    }
}
