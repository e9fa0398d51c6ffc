use hal::{
    self,
    gpio::Pin,
    pac::SPI2,
    spi::{BaudRate, Spi, SpiConfig, SpiError, SpiMode},
};

use hmdscan_algo::output::AnalogOutput;

use super::pinout;

/// Two AD420 current-loop DACs daisy-chained on SPI2 with a common latch.
pub struct SpiDac {
    spi: Spi<SPI2>,
    latch: Pin,
}

impl SpiDac {
    pub fn new(spi_reg: SPI2) -> Self {
        // AD420: CPOL=0, CPHA=0, at most 3.3 MHz
        let spi_cfg = SpiConfig {
            mode: SpiMode::mode0(),
            ..Default::default()
        };

        pinout::bus::SPI2_SCK.init();
        pinout::bus::SPI2_MISO.init();
        pinout::bus::SPI2_MOSI.init();
        let mut latch = pinout::bus::DAC_LATCH.init();
        latch.set_high();

        let spi = Spi::new(spi_reg, spi_cfg, BaudRate::Div64);

        SpiDac { spi, latch }
    }
}

impl AnalogOutput for SpiDac {
    type Error = SpiError;

    fn write_pair(&mut self, channel1: u16, channel2: u16) -> Result<(), SpiError> {
        // Channel 2 is shifted through to the far DAC, so it goes first
        let [c2_hi, c2_lo] = channel2.to_be_bytes();
        let [c1_hi, c1_lo] = channel1.to_be_bytes();

        self.latch.set_low();
        let result = self.spi.write(&[c2_hi, c2_lo, c1_hi, c1_lo]);
        self.latch.set_high(); // Rising edge loads both DAC registers
        result
    }
}
