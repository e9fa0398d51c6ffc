//! `stm32-hal2` implementations of the sensor hardware traits for the STM32G431.

#![no_std]

pub mod capture;
pub mod dac;
pub mod flash_store;
pub mod io;
pub mod pinout;
pub mod rs485;
pub mod temperature;
pub mod timers;
