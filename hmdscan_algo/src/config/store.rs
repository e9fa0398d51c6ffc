// Durable storage of the configuration and lifetime counters.

// Key Features:
// - `NonvolatileStore` trait: key-addressed u16 words, implemented per target
// - Signature check (model, serial, firmware) with defaults written on mismatch
// - Factory reset keeping the position offset, identity and lifetime counters
// - Per-register persistence for validated register writes, committed in one flush

// Detailed Operation:
// Each tunable owns a fixed store address (`ConfigKey`). At startup the three
// identity words are compared against the compiled-in identity; on mismatch the
// factory defaults are written and then loaded like any valid image. Words read
// back from the store are validated the same way as register writes, a corrupt
// word falls back to its factory default.
//
// Writes are staged by the store and become durable on `flush`. Every public
// operation here ends with exactly one flush, except `persist`: a register
// exchange stages all adopted words first and then calls `commit` once, so a
// burst of master writes costs a single page program.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use super::{defaults, ConfigParameters};
use crate::registers::{Register, CONFIG_REGISTERS};

/// Word-level storage primitives, provided by the target.
pub trait NonvolatileStore {
    type Error;

    /// Reads a word, including writes not yet flushed.
    fn read_word(&mut self, address: u16) -> Result<u16, Self::Error>;
    /// Stages a word for the next flush.
    fn write_word(&mut self, address: u16, value: u16) -> Result<(), Self::Error>;
    /// Makes every staged word durable. Does nothing when nothing changed.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Store addresses of every persisted word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ConfigKey {
    ModelType = 0x00,
    SerialNumber = 0x02,
    FirmwareVersion = 0x04,
    SlaveId = 0x06,
    BaudRate = 0x08,
    FrameFormat = 0x10,
    SetMode = 0x12,
    GainSet1 = 0x14,
    ThresholdSet1 = 0x16,
    GainSet2 = 0x18,
    ThresholdSet2 = 0x20,
    WindowBegin = 0x22,
    WindowEnd = 0x24,
    PositionMode = 0x26,
    AnalogOutMode = 0x28,
    PositionOffset = 0x30,
    FilterPosition = 0x32,
    FilterOn = 0x34,
    FilterOff = 0x36,
    MaxTemperature = 0x38,
    TotalRuntime = 0x40,
}

impl ConfigKey {
    #[inline(always)]
    pub const fn address(self) -> u16 {
        self as u16
    }

    /// Store key backing a writable configuration register.
    pub const fn for_register(register: Register) -> Option<ConfigKey> {
        let key = match register {
            Register::SlaveId => ConfigKey::SlaveId,
            Register::BaudRate => ConfigKey::BaudRate,
            Register::FrameFormat => ConfigKey::FrameFormat,
            Register::SetMode => ConfigKey::SetMode,
            Register::GainSet1 => ConfigKey::GainSet1,
            Register::ThresholdSet1 => ConfigKey::ThresholdSet1,
            Register::GainSet2 => ConfigKey::GainSet2,
            Register::ThresholdSet2 => ConfigKey::ThresholdSet2,
            Register::WindowBegin => ConfigKey::WindowBegin,
            Register::WindowEnd => ConfigKey::WindowEnd,
            Register::PositionMode => ConfigKey::PositionMode,
            Register::AnalogOutMode => ConfigKey::AnalogOutMode,
            Register::PositionOffset => ConfigKey::PositionOffset,
            Register::FilterPosition => ConfigKey::FilterPosition,
            Register::FilterOn => ConfigKey::FilterOn,
            Register::FilterOff => ConfigKey::FilterOff,
            _ => return None,
        };
        Some(key)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    Read(ConfigKey),
    Write(ConfigKey),
    Flush,
}

/// Counters that survive factory resets.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lifetime {
    /// Highest temperature seen, °C.
    pub max_temperature: i16,
    /// Operating hours.
    pub total_runtime: u16,
}

/// Configuration layer on top of a `NonvolatileStore`.
pub struct ConfigStore<S: NonvolatileStore> {
    store: S,
}

impl<S: NonvolatileStore> ConfigStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn read(&mut self, key: ConfigKey) -> Result<u16, StoreError> {
        self.store
            .read_word(key.address())
            .map_err(|_| StoreError::Read(key))
    }

    fn write(&mut self, key: ConfigKey, value: u16) -> Result<(), StoreError> {
        self.store
            .write_word(key.address(), value)
            .map_err(|_| StoreError::Write(key))
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &S {
        &self.store
    }

    /// Makes staged words durable.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.store.flush().map_err(|_| StoreError::Flush)
    }

    /// True when the stored identity matches this firmware.
    pub fn signature_matches(&mut self) -> Result<bool, StoreError> {
        Ok(self.read(ConfigKey::ModelType)? == defaults::MODEL_TYPE
            && self.read(ConfigKey::SerialNumber)? == defaults::SERIAL_NUMBER
            && self.read(ConfigKey::FirmwareVersion)? == defaults::FIRMWARE_VERSION)
    }

    /// Startup sequence: load the stored image, writing defaults first when the signature does not match.
    pub fn init(&mut self) -> Result<(ConfigParameters, Lifetime), StoreError> {
        if self.signature_matches()? {
            info!("CONFIG: signature valid");
        } else {
            warn!("CONFIG: signature mismatch, writing factory defaults");
            self.write_defaults(&Lifetime::default())?;
        }
        self.load()
    }

    /// Reads every tunable and the lifetime counters.
    pub fn load(&mut self) -> Result<(ConfigParameters, Lifetime), StoreError> {
        let mut config = defaults::FACTORY;
        for register in CONFIG_REGISTERS {
            if let Some(key) = ConfigKey::for_register(register) {
                let word = self.read(key)?;
                if !config.apply_register(register, word) {
                    warn!("CONFIG: stored {} = {} invalid, using default", key, word);
                }
            }
        }

        let lifetime = Lifetime {
            max_temperature: self.read(ConfigKey::MaxTemperature)? as i16,
            total_runtime: self.read(ConfigKey::TotalRuntime)?,
        };
        Ok((config, lifetime))
    }

    /// Writes the identity, every factory default and the given lifetime counters.
    pub fn write_defaults(&mut self, lifetime: &Lifetime) -> Result<(), StoreError> {
        self.write(ConfigKey::ModelType, defaults::MODEL_TYPE)?;
        self.write(ConfigKey::SerialNumber, defaults::SERIAL_NUMBER)?;
        self.write(ConfigKey::FirmwareVersion, defaults::FIRMWARE_VERSION)?;
        self.write_tunables(true)?;
        self.write(ConfigKey::MaxTemperature, lifetime.max_temperature as u16)?;
        self.write(ConfigKey::TotalRuntime, lifetime.total_runtime)?;
        self.commit()
    }

    /// Restores the factory tunables except the position offset and returns the reloaded configuration.
    pub fn factory_reset(&mut self) -> Result<ConfigParameters, StoreError> {
        info!("CONFIG: factory reset");
        self.write_tunables(false)?;
        self.commit()?;
        Ok(self.load()?.0)
    }

    fn write_tunables(&mut self, with_offset: bool) -> Result<(), StoreError> {
        for register in CONFIG_REGISTERS {
            if register == Register::PositionOffset && !with_offset {
                continue;
            }
            if let (Some(key), Some(value)) = (
                ConfigKey::for_register(register),
                defaults::FACTORY.register_value(register),
            ) {
                self.write(key, value)?;
            }
        }
        Ok(())
    }

    /// Stages one adopted configuration register; `commit` makes it durable.
    pub fn persist(&mut self, register: Register, value: u16) -> Result<(), StoreError> {
        match ConfigKey::for_register(register) {
            Some(key) => self.write(key, value),
            None => Ok(()),
        }
    }

    pub fn persist_max_temperature(&mut self, celsius: i16) -> Result<(), StoreError> {
        self.write(ConfigKey::MaxTemperature, celsius as u16)?;
        self.commit()
    }

    pub fn persist_runtime(&mut self, hours: u16) -> Result<(), StoreError> {
        self.write(ConfigKey::TotalRuntime, hours)?;
        self.commit()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Gain, PositionOffset};

    /// Store fake backed by RAM, erased to 0xFFFF. `words` is the durable
    /// image, `staged` the mirror that writes land in until a flush.
    pub struct RamStore {
        pub words: [u16; 0x80],
        pub staged: [u16; 0x80],
        pub writes: usize,
        pub flushes: usize,
        pub fail_writes: bool,
    }

    impl RamStore {
        pub fn erased() -> Self {
            Self {
                words: [0xFFFF; 0x80],
                staged: [0xFFFF; 0x80],
                writes: 0,
                flushes: 0,
                fail_writes: false,
            }
        }
    }

    impl NonvolatileStore for RamStore {
        type Error = ();

        fn read_word(&mut self, address: u16) -> Result<u16, ()> {
            self.staged.get(address as usize).copied().ok_or(())
        }

        fn write_word(&mut self, address: u16, value: u16) -> Result<(), ()> {
            if self.fail_writes {
                return Err(());
            }
            self.writes += 1;
            *self.staged.get_mut(address as usize).ok_or(())? = value;
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ()> {
            if self.staged != self.words {
                self.flushes += 1;
                self.words = self.staged;
            }
            Ok(())
        }
    }

    #[test]
    fn blank_store_receives_defaults() {
        let mut store = ConfigStore::new(RamStore::erased());
        let (config, lifetime) = store.init().unwrap();
        assert_eq!(config, defaults::FACTORY);
        assert_eq!(lifetime, Lifetime::default());
        assert!(store.signature_matches().unwrap());
        assert_eq!(store.store.words[ConfigKey::SlaveId as usize], 1);
    }

    #[test]
    fn valid_image_is_loaded_untouched() {
        let mut store = ConfigStore::new(RamStore::erased());
        store.init().unwrap();
        store.persist(Register::GainSet2, 64).unwrap();
        store.persist_runtime(12).unwrap();

        let writes = store.store.writes;
        let (config, lifetime) = store.init().unwrap();
        assert_eq!(store.store.writes, writes);
        assert_eq!(config.gain2, Gain::X64);
        assert_eq!(lifetime.total_runtime, 12);
    }

    #[test]
    fn corrupt_word_falls_back_to_default() {
        let mut store = ConfigStore::new(RamStore::erased());
        store.init().unwrap();
        store.store.staged[ConfigKey::WindowEnd as usize] = 120;
        let (config, _) = store.load().unwrap();
        assert_eq!(config.window_end, defaults::FACTORY.window_end);
    }

    #[test]
    fn factory_reset_keeps_offset_and_lifetime() {
        let mut store = ConfigStore::new(RamStore::erased());
        store.init().unwrap();
        store.persist(Register::PositionOffset, 1500).unwrap();
        store.persist(Register::ThresholdSet1, 70).unwrap();
        store.persist_max_temperature(61).unwrap();

        let config = store.factory_reset().unwrap();
        assert_eq!(config.position_offset, PositionOffset::from_register(1500).unwrap());
        assert_eq!(config.threshold1, defaults::FACTORY.threshold1);
        assert_eq!(store.load().unwrap().1.max_temperature, 61);
    }

    #[test]
    fn batch_operations_flush_once() {
        let mut store = ConfigStore::new(RamStore::erased());
        store.init().unwrap();
        assert_eq!(store.store.flushes, 1);
        assert_eq!(store.store.words[ConfigKey::TotalRuntime as usize], 0);

        store.persist(Register::GainSet1, 4).unwrap();
        store.persist(Register::WindowBegin, 30).unwrap();
        assert_eq!(store.store.flushes, 1);
        assert_eq!(store.store.words[ConfigKey::GainSet1 as usize], 16);
        // Staged words are already visible to reads
        assert_eq!(store.load().unwrap().0.gain1, Gain::X4);

        store.commit().unwrap();
        assert_eq!(store.store.flushes, 2);
        assert_eq!(store.store.words[ConfigKey::WindowBegin as usize], 30);

        store.commit().unwrap();
        store.factory_reset().unwrap();
        assert_eq!(store.store.flushes, 3);
    }

    #[test]
    fn write_failure_names_the_key() {
        let mut store = ConfigStore::new(RamStore::erased());
        store.store.fail_writes = true;
        assert_eq!(store.init(), Err(StoreError::Write(ConfigKey::ModelType)));
        assert_eq!(
            store.persist(Register::FilterOn, 5),
            Err(StoreError::Write(ConfigKey::FilterOn))
        );
        assert_eq!(store.persist(Register::PeakValue, 5), Ok(()));
    }
}
