// Word store emulated on the last flash page.

// Detailed Operation:
// The page content is mirrored in RAM at startup. Reads come from the mirror.
// A write that changes a word only updates the mirror and marks it dirty;
// `flush` rewrites the whole page (erase then program) once for everything
// staged since the previous flush.
//
// The G431 has a single flash bank, so the CPU cannot fetch code while the page
// is erased and programmed (about 20 ms). Every interrupt is held off for that
// time, including the motor clock tick. The configuration layer therefore
// flushes once per operation: once per register exchange that adopted values,
// once per startup default image, on a new temperature maximum and every 4
// runtime hours. An erased page reads 0xFFFF everywhere, which fails the
// identity check and makes the configuration layer write its defaults.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use hal::{
    self,
    flash::{Bank, Flash},
    pac::FLASH,
};

use hmdscan_algo::config::store::NonvolatileStore;

/// Last 2 KiB page of the 128 KiB G431 flash, excluded from `memory.x`.
pub const STORE_PAGE: usize = 63;
/// Mirrored bytes, covers every config address (multiple of the 8-byte program unit).
pub const STORE_LEN: usize = 128;

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum FlashStoreError {
    /// Address outside the mirrored area.
    Address(u16),
    /// Page erase or program failed.
    Program,
}

pub struct FlashStore {
    flash: Flash,
    mirror: [u8; STORE_LEN],
    dirty: bool, // Mirror differs from the page
}

impl FlashStore {
    pub fn new(flash_reg: FLASH) -> Self {
        let flash = Flash::new(flash_reg);
        let mut mirror = [0xFF; STORE_LEN];
        flash.read(Bank::B1, STORE_PAGE, 0, &mut mirror);

        FlashStore {
            flash,
            mirror,
            dirty: false,
        }
    }

    fn span(address: u16) -> Result<core::ops::Range<usize>, FlashStoreError> {
        let start = address as usize;
        if start + 2 > STORE_LEN {
            return Err(FlashStoreError::Address(address));
        }
        Ok(start..start + 2)
    }
}

impl NonvolatileStore for FlashStore {
    type Error = FlashStoreError;

    fn read_word(&mut self, address: u16) -> Result<u16, FlashStoreError> {
        let span = Self::span(address)?;
        Ok(u16::from_le_bytes([self.mirror[span.start], self.mirror[span.start + 1]]))
    }

    fn write_word(&mut self, address: u16, value: u16) -> Result<(), FlashStoreError> {
        let span = Self::span(address)?;
        let bytes = value.to_le_bytes();
        if self.mirror[span.clone()] == bytes {
            return Ok(());
        }
        self.mirror[span].copy_from_slice(&bytes);
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FlashStoreError> {
        if !self.dirty {
            return Ok(());
        }
        self.flash
            .erase_write_page(Bank::B1, STORE_PAGE, &self.mirror)
            .map_err(|_| FlashStoreError::Program)?;
        self.dirty = false;
        defmt::debug!("CONFIG: flash page {} written", STORE_PAGE);
        Ok(())
    }
}
