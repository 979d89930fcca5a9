//! Raw MIDI transport over ALSA character devices
//!
//! Cards come from `/proc/asound/cards`; the first raw MIDI device of card
//! `n` is `/dev/snd/midiC<n>D0`. Writing SysEx bytes to it is all the jig
//! needs, so no sequencer client is involved.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::JigError;
use crate::hardware::{MidiBus, MidiPort};

/// One sound card entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundCard {
    pub index: u32,
    pub name: String,
}

/// Parse `/proc/asound/cards`
///
/// ```text
///  1 [Biotron        ]: USB-Audio - Biotron
///                       Biotron at usb-3f980000.usb-1.2, full speed
/// ```
pub fn parse_sound_cards(listing: &str) -> Vec<SoundCard> {
    listing
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (index, rest) = line.split_once(' ')?;
            let index = index.parse().ok()?;
            let (_, description) = rest.split_once("]: ")?;
            let name = description
                .split_once(" - ")
                .map(|(_, long)| long)
                .unwrap_or(description)
                .trim()
                .to_string();
            Some(SoundCard { index, name })
        })
        .collect()
}

/// Raw MIDI devices found through procfs
#[derive(Debug, Clone)]
pub struct RawMidiBus {
    cards_path: PathBuf,
    dev_dir: PathBuf,
}

impl Default for RawMidiBus {
    fn default() -> Self {
        Self::new("/proc/asound/cards", "/dev/snd")
    }
}

impl RawMidiBus {
    pub fn new(cards_path: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            cards_path: cards_path.into(),
            dev_dir: dev_dir.into(),
        }
    }

    fn cards(&self) -> Result<Vec<SoundCard>, JigError> {
        let listing = fs::read_to_string(&self.cards_path)?;
        Ok(parse_sound_cards(&listing))
    }

    fn device_path(&self, card: &SoundCard) -> PathBuf {
        self.dev_dir.join(format!("midiC{}D0", card.index))
    }
}

impl MidiBus for RawMidiBus {
    fn output_names(&self) -> Result<Vec<String>, JigError> {
        let names: Vec<String> = self
            .cards()?
            .into_iter()
            .filter(|card| self.device_path(card).exists())
            .map(|card| card.name)
            .collect();
        debug!(outputs = ?names, "MIDI outputs");
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<Box<dyn MidiPort>, JigError> {
        let card = self
            .cards()?
            .into_iter()
            .find(|card| card.name == name)
            .ok_or_else(|| JigError::Midi(format!("no output named {}", name)))?;
        let path = self.device_path(&card);
        let port = RawMidiPort::open(name, &path)?;
        info!(name, device = %path.display(), "MIDI output opened");
        Ok(Box::new(port))
    }
}

/// An open `/dev/snd/midiC*D*` device; closed on drop
#[derive(Debug)]
pub struct RawMidiPort {
    name: String,
    file: File,
}

impl RawMidiPort {
    pub fn open(name: &str, path: &Path) -> Result<Self, JigError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| JigError::Midi(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            name: name.to_string(),
            file,
        })
    }
}

impl MidiPort for RawMidiPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, message: &[u8]) -> Result<(), JigError> {
        self.file.write_all(message)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARDS: &str = " 0 [ALSA           ]: bcm2835_alsa - bcm2835 ALSA\n                      bcm2835 ALSA\n 1 [Biotron        ]: USB-Audio - Biotron\n                      Biotron at usb-3f980000.usb-1.2, full speed\n";

    #[test]
    fn test_parse_cards() {
        let cards = parse_sound_cards(CARDS);
        assert_eq!(
            cards,
            vec![
                SoundCard { index: 0, name: "bcm2835 ALSA".to_string() },
                SoundCard { index: 1, name: "Biotron".to_string() },
            ]
        );
    }

    #[test]
    fn test_bus_over_scratch_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let cards = dir.path().join("cards");
        fs::write(&cards, CARDS).unwrap();
        fs::write(dir.path().join("midiC1D0"), b"").unwrap();

        let bus = RawMidiBus::new(&cards, dir.path());
        assert_eq!(bus.output_names().unwrap(), vec!["Biotron".to_string()]);

        let mut port = bus.open("Biotron").unwrap();
        port.send(&[0xF0, 0x0B, 0x14, 0x0D, 0x03, 0xF7]).unwrap();
        drop(port);
        assert_eq!(
            fs::read(dir.path().join("midiC1D0")).unwrap(),
            vec![0xF0, 0x0B, 0x14, 0x0D, 0x03, 0xF7]
        );
        assert!(bus.open("Missing").is_err());
    }
}
