// Holding register file shared with the Modbus master, and the per-loop exchange
// between it and the live device state.

// Key Features:
// - Fixed, versioned register layout (`Register`) with 58 words
// - Telemetry and configuration pushed into the file once per main loop iteration
// - Transport served through the `RegisterTransport` contract
// - Changed configuration registers validated, adopted and persisted
// - Writes to the I/O state word turned into laser / IR LED requests

// Detailed Operation:
// The device state stays authoritative: every iteration starts by overwriting the
// whole file with current values. Whatever the master writes during the transport
// poll therefore shows up as a difference against the configuration. Accepted
// differences are adopted and stored; rejected ones are left in place and vanish
// with the next push.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

pub mod rtu;

use crate::config::store::{ConfigStore, NonvolatileStore};
use crate::config::{defaults, ConfigParameters};
use crate::diagnostics::IoState;

/// Number of words in the register file.
pub const REGISTER_COUNT: usize = 58;

/// Words of the rotating raw-sample snapshot.
pub const SNAPSHOT_WORDS: usize = 25;

/// Holding register indices.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Register {
    Size = 0,
    ModelType = 1,
    SerialNumber = 2,
    FirmwareVersion = 3,
    SlaveId = 4,
    BaudRate = 5,
    FrameFormat = 6,
    SetMode = 7,
    GainSet1 = 8,
    ThresholdSet1 = 9,
    GainSet2 = 10,
    ThresholdSet2 = 11,
    WindowBegin = 12,
    WindowEnd = 13,
    PositionMode = 14,
    AnalogOutMode = 15,
    PositionOffset = 16,
    FilterPosition = 17,
    FilterOn = 18,
    FilterOff = 19,
    ActTemperature = 20,
    MaxTemperature = 21,
    TotalRuntime = 22,
    IoState = 23,
    PeakValue = 24,
    PositionValue = 25,
    PositionValueAvg = 26,
    /// First word of the snapshot block (27..=51).
    Snapshot = 27,
    MotorTimeDiff = 52,
    ExecTimeAdc = 53,
    ExecTime = 54,
    ExecTimeTrigger = 55,
    OffsetDelay = 56,
    TotalErrors = 57,
}

/// Registers that mirror `ConfigParameters`, in store order.
pub const CONFIG_REGISTERS: [Register; 16] = [
    Register::SlaveId,
    Register::BaudRate,
    Register::FrameFormat,
    Register::SetMode,
    Register::GainSet1,
    Register::ThresholdSet1,
    Register::GainSet2,
    Register::ThresholdSet2,
    Register::WindowBegin,
    Register::WindowEnd,
    Register::PositionMode,
    Register::AnalogOutMode,
    Register::PositionOffset,
    Register::FilterPosition,
    Register::FilterOn,
    Register::FilterOff,
];

impl Register {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Changing this register restarts the serial link.
    pub const fn is_network(self) -> bool {
        matches!(
            self,
            Register::SlaveId | Register::BaudRate | Register::FrameFormat
        )
    }
}

/// The word array exposed over the transport.
pub struct RegisterFile {
    words: [u16; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        let mut words = [0; REGISTER_COUNT];
        words[Register::Size.index()] = REGISTER_COUNT as u16;
        Self { words }
    }

    #[inline(always)]
    pub fn get(&self, register: Register) -> u16 {
        self.words[register.index()]
    }

    #[inline(always)]
    pub fn set(&mut self, register: Register, value: u16) {
        self.words[register.index()] = value;
    }

    pub fn words_mut(&mut self) -> &mut [u16] {
        &mut self.words
    }

    pub fn snapshot(&self) -> &[u16] {
        let start = Register::Snapshot.index();
        &self.words[start..start + SNAPSHOT_WORDS]
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Request/response transport operating on the register file.
pub trait RegisterTransport {
    /// Serves at most one pending request against `registers`.
    ///
    /// Returns the cumulative protocol error count.
    fn poll(&mut self, registers: &mut [u16], now_us: u32) -> u16;
}

/// Read-only values pushed into the file every iteration.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub temperature: i16,
    pub max_temperature: i16,
    pub total_runtime: u16,
    pub io_state: IoState,
    pub peak_percent: u16,
    pub position: u16,
    pub position_avg: u16,
    pub motor_time_diff: u16,
    pub exec_time_adc: u16,
    pub exec_time: u16,
    pub exec_time_trigger: u16,
    pub offset_delay: u16,
}

/// Master request on the writable I/O bits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IoRequest {
    pub laser: bool,
    pub ir_led: bool,
}

/// What changed during one exchange.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExchangeOutcome {
    /// At least one configuration register was adopted.
    pub config_changed: bool,
    /// Slave id, baud rate or frame format was adopted.
    pub link_changed: bool,
    pub io_request: Option<IoRequest>,
}

pub struct RegisterExchange {
    file: RegisterFile,
    pushed_io: IoState,
    total_errors: u16,
}

impl RegisterExchange {
    pub fn new() -> Self {
        Self {
            file: RegisterFile::new(),
            pushed_io: IoState::default(),
            total_errors: 0,
        }
    }

    pub fn file(&self) -> &RegisterFile {
        &self.file
    }

    /// Overwrites identity, configuration and telemetry words with current values.
    pub fn push(&mut self, config: &ConfigParameters, telemetry: &Telemetry) {
        let file = &mut self.file;
        file.set(Register::Size, REGISTER_COUNT as u16);
        file.set(Register::ModelType, defaults::MODEL_TYPE);
        file.set(Register::SerialNumber, defaults::SERIAL_NUMBER);
        file.set(Register::FirmwareVersion, defaults::FIRMWARE_VERSION);

        for register in CONFIG_REGISTERS {
            if let Some(value) = config.register_value(register) {
                file.set(register, value);
            }
        }

        file.set(Register::ActTemperature, telemetry.temperature as u16);
        file.set(Register::MaxTemperature, telemetry.max_temperature as u16);
        file.set(Register::TotalRuntime, telemetry.total_runtime);
        file.set(Register::IoState, telemetry.io_state.bits());
        file.set(Register::PeakValue, telemetry.peak_percent);
        file.set(Register::PositionValue, telemetry.position);
        file.set(Register::PositionValueAvg, telemetry.position_avg);
        file.set(Register::MotorTimeDiff, telemetry.motor_time_diff);
        file.set(Register::ExecTimeAdc, telemetry.exec_time_adc);
        file.set(Register::ExecTime, telemetry.exec_time);
        file.set(Register::ExecTimeTrigger, telemetry.exec_time_trigger);
        file.set(Register::OffsetDelay, telemetry.offset_delay);
        file.set(Register::TotalErrors, self.total_errors);
        self.pushed_io = telemetry.io_state;
    }

    /// Copies a packed raw-sample snapshot into the snapshot block.
    pub fn publish_snapshot(&mut self, words: &[u16; SNAPSHOT_WORDS]) {
        let start = Register::Snapshot.index();
        self.file.words_mut()[start..start + SNAPSHOT_WORDS].copy_from_slice(words);
    }

    /// Lets the transport serve a pending request and records its error count.
    pub fn serve<T: RegisterTransport>(&mut self, transport: &mut T, now_us: u32) {
        self.total_errors = transport.poll(self.file.words_mut(), now_us);
        self.file.set(Register::TotalErrors, self.total_errors);
    }

    /// Adopts and persists every configuration register the master changed.
    ///
    /// # Arguments
    /// * `config` - Live configuration, updated in place
    /// * `store` - Persistence for adopted values, committed once after all of them;
    ///   failures are logged and the value is kept
    pub fn apply_writes<S: NonvolatileStore>(
        &mut self,
        config: &mut ConfigParameters,
        store: &mut ConfigStore<S>,
    ) -> ExchangeOutcome {
        let mut outcome = ExchangeOutcome::default();

        for register in CONFIG_REGISTERS {
            let word = self.file.get(register);
            if config.register_value(register) == Some(word) {
                continue;
            }
            if !config.apply_register(register, word) {
                debug!("MODBUS: rejected {} = {}", register, word);
                continue;
            }

            info!("MODBUS: {} set to {}", register, word);
            outcome.config_changed = true;
            outcome.link_changed |= register.is_network();
            if let Err(e) = store.persist(register, word) {
                warn!("CONFIG: persist failed: {}", e);
            }
        }
        if outcome.config_changed {
            if let Err(e) = store.commit() {
                warn!("CONFIG: commit failed: {}", e);
            }
        }

        let io_word = self.file.get(Register::IoState);
        if io_word != self.pushed_io.bits() {
            let requested = IoState::from_bits(io_word);
            outcome.io_request = Some(IoRequest {
                laser: requested.contains(IoState::LASER),
                ir_led: requested.contains(IoState::IR_LED),
            });
        }

        outcome
    }

    /// One full main-loop exchange: push, optional snapshot, serve, apply.
    pub fn cycle<T: RegisterTransport, S: NonvolatileStore>(
        &mut self,
        config: &mut ConfigParameters,
        telemetry: &Telemetry,
        snapshot: Option<&[u16; SNAPSHOT_WORDS]>,
        transport: &mut T,
        store: &mut ConfigStore<S>,
        now_us: u32,
    ) -> ExchangeOutcome {
        self.push(config, telemetry);
        if let Some(words) = snapshot {
            self.publish_snapshot(words);
        }
        self.serve(transport, now_us);
        self.apply_writes(config, store)
    }
}

impl Default for RegisterExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::tests::RamStore;
    use crate::config::store::ConfigKey;
    use crate::config::Gain;

    /// Transport fake that applies queued single-register writes, one per poll.
    struct ScriptedMaster {
        writes: heapless::Vec<(Register, u16), 8>,
        errors: u16,
    }

    impl ScriptedMaster {
        fn new(writes: &[(Register, u16)]) -> Self {
            let mut queue = heapless::Vec::new();
            for w in writes.iter().rev() {
                queue.push(*w).unwrap();
            }
            Self {
                writes: queue,
                errors: 0,
            }
        }
    }

    impl RegisterTransport for ScriptedMaster {
        fn poll(&mut self, registers: &mut [u16], _now_us: u32) -> u16 {
            if let Some((register, value)) = self.writes.pop() {
                registers[register.index()] = value;
            }
            self.errors
        }
    }

    /// Transport fake writing one contiguous block, like a function 16 request.
    struct BlockWrite {
        start: Register,
        words: &'static [u16],
    }

    impl RegisterTransport for BlockWrite {
        fn poll(&mut self, registers: &mut [u16], _now_us: u32) -> u16 {
            let start = self.start.index();
            registers[start..start + self.words.len()].copy_from_slice(self.words);
            0
        }
    }

    fn setup() -> (RegisterExchange, ConfigParameters, ConfigStore<RamStore>) {
        let mut store = ConfigStore::new(RamStore::erased());
        let (config, _) = store.init().unwrap();
        (RegisterExchange::new(), config, store)
    }

    #[test]
    fn layout_is_stable() {
        assert_eq!(Register::TotalErrors.index(), REGISTER_COUNT - 1);
        assert_eq!(Register::Snapshot.index() + SNAPSHOT_WORDS, Register::MotorTimeDiff.index());
        assert_eq!(RegisterFile::new().get(Register::Size), 58);
    }

    #[test]
    fn valid_write_round_trips() {
        let (mut exchange, mut config, mut store) = setup();
        let telemetry = Telemetry::default();
        let mut master = ScriptedMaster::new(&[(Register::GainSet1, 8)]);

        let outcome = exchange.cycle(&mut config, &telemetry, None, &mut master, &mut store, 0);
        assert!(outcome.config_changed);
        assert!(!outcome.link_changed);
        assert_eq!(config.gain1, Gain::X8);

        exchange.push(&config, &telemetry);
        assert_eq!(exchange.file().get(Register::GainSet1), 8);
        assert_eq!(store.load().unwrap().0.gain1, Gain::X8);
    }

    #[test]
    fn block_write_is_committed_once() {
        let (mut exchange, mut config, mut store) = setup();
        let flushes = store.backend().flushes;
        // Gain set 1, threshold set 1, gain set 2, threshold set 2
        let mut master = BlockWrite {
            start: Register::GainSet1,
            words: &[4, 60, 64, 40],
        };

        let outcome = exchange.cycle(&mut config, &Telemetry::default(), None, &mut master, &mut store, 0);
        assert!(outcome.config_changed);
        assert_eq!(store.backend().flushes, flushes + 1);
        assert_eq!(store.backend().words[ConfigKey::GainSet2 as usize], 64);
        assert_eq!(store.backend().words[ConfigKey::ThresholdSet2 as usize], 40);

        // Nothing new on the next exchange: no flash activity
        exchange.cycle(&mut config, &Telemetry::default(), None, &mut master, &mut store, 0);
        assert_eq!(store.backend().flushes, flushes + 1);
    }

    #[test]
    fn invalid_write_reverts_on_next_push() {
        let (mut exchange, mut config, mut store) = setup();
        let telemetry = Telemetry::default();
        let mut master = ScriptedMaster::new(&[(Register::ThresholdSet1, 95)]);

        let outcome = exchange.cycle(&mut config, &telemetry, None, &mut master, &mut store, 0);
        assert_eq!(outcome, ExchangeOutcome::default());
        assert_eq!(config.threshold1.to_register(), 50);
        assert_eq!(exchange.file().get(Register::ThresholdSet1), 95);

        exchange.push(&config, &telemetry);
        assert_eq!(exchange.file().get(Register::ThresholdSet1), 50);
        assert_eq!(store.load().unwrap().0.threshold1.to_register(), 50);
    }

    #[test]
    fn network_write_requests_link_restart() {
        let (mut exchange, mut config, mut store) = setup();
        let mut master = ScriptedMaster::new(&[(Register::BaudRate, 1152)]);
        let outcome = exchange.cycle(
            &mut config,
            &Telemetry::default(),
            None,
            &mut master,
            &mut store,
            0,
        );
        assert!(outcome.link_changed);
        assert_eq!(config.link().baud_rate.bits_per_second(), 115_200);
    }

    #[test]
    fn io_state_write_becomes_request() {
        let (mut exchange, mut config, mut store) = setup();
        let telemetry = Telemetry {
            io_state: IoState::from_bits(IoState::LED_POWER),
            ..Telemetry::default()
        };
        let mut master =
            ScriptedMaster::new(&[(Register::IoState, IoState::LED_POWER | IoState::LASER)]);
        let outcome = exchange.cycle(&mut config, &telemetry, None, &mut master, &mut store, 0);
        assert_eq!(
            outcome.io_request,
            Some(IoRequest {
                laser: true,
                ir_led: false
            })
        );
    }

    #[test]
    fn read_only_words_are_overwritten() {
        let (mut exchange, mut config, mut store) = setup();
        let telemetry = Telemetry {
            peak_percent: 42,
            ..Telemetry::default()
        };
        let mut master = ScriptedMaster::new(&[(Register::PeakValue, 7)]);
        exchange.cycle(&mut config, &telemetry, None, &mut master, &mut store, 0);
        exchange.push(&config, &telemetry);
        assert_eq!(exchange.file().get(Register::PeakValue), 42);
        assert_eq!(store.load().unwrap().0, config);
    }

    #[test]
    fn snapshot_and_error_count_are_published() {
        let (mut exchange, mut config, mut store) = setup();
        let mut words = [0u16; SNAPSHOT_WORDS];
        words[0] = 0x1234;
        words[24] = 0xABCD;
        let mut master = ScriptedMaster::new(&[]);
        master.errors = 3;

        exchange.cycle(
            &mut config,
            &Telemetry::default(),
            Some(&words),
            &mut master,
            &mut store,
            0,
        );
        assert_eq!(exchange.file().snapshot(), &words[..]);
        assert_eq!(exchange.file().get(Register::TotalErrors), 3);
        assert_eq!(store.load().unwrap().0.slave_id.to_register(), 1);
        assert_eq!(ConfigKey::for_register(Register::Snapshot), None);
    }
}
