use hal::{
    self,
    adc::{Adc, AdcDevice, InputType, SampleTime},
    clocks::Clocks,
    pac::{self, ADC1},
};

/// Internal temperature sensor channel of ADC1.
const TEMP_CHANNEL: u8 = 16;

/// Factory calibration words, measured at VDDA = 3.0 V.
const TS_CAL1: *const u16 = 0x1FFF_75A8 as *const u16; // 30 °C
const TS_CAL2: *const u16 = 0x1FFF_75CA as *const u16; // 130 °C
const TS_CAL1_TEMP: i32 = 30;
const TS_CAL2_TEMP: i32 = 130;

/// Board VDDA and calibration VDDA, mV.
const VDDA_MV: i32 = 3300;
const CAL_VDDA_MV: i32 = 3000;

/// Die temperature from the internal sensor of ADC1.
pub struct TemperatureSensor {
    adc: Adc<ADC1>,
    cal1: i32,
    cal2: i32,
}

impl TemperatureSensor {
    pub fn new(adc1: ADC1, clock_cfg: &Clocks) -> Self {
        let mut adc = Adc::new_adc1(adc1, AdcDevice::One, Default::default(), clock_cfg.systick());
        adc.set_input_type(TEMP_CHANNEL, InputType::SingleEnded);
        // Sensor needs > 5 µs sampling
        adc.set_sample_time(TEMP_CHANNEL, SampleTime::T640);

        // Route the sensor to ADC1 (VSENSESEL)
        unsafe {
            (*pac::ADC12_COMMON::ptr())
                .ccr
                .modify(|_, w| w.vsensesel().set_bit());
        }

        let (cal1, cal2) = unsafe {
            (
                core::ptr::read_volatile(TS_CAL1) as i32,
                core::ptr::read_volatile(TS_CAL2) as i32,
            )
        };

        TemperatureSensor { adc, cal1, cal2 }
    }

    /// Blocking single conversion, °C.
    pub fn read_celsius(&mut self) -> i16 {
        let raw = self.adc.read(TEMP_CHANNEL) as i32;
        Self::to_celsius(raw, self.cal1, self.cal2)
    }

    fn to_celsius(raw: i32, cal1: i32, cal2: i32) -> i16 {
        if cal2 == cal1 {
            return 0;
        }
        let scaled = raw * VDDA_MV / CAL_VDDA_MV;
        let celsius =
            (scaled - cal1) * (TS_CAL2_TEMP - TS_CAL1_TEMP) / (cal2 - cal1) + TS_CAL1_TEMP;
        celsius as i16
    }
}
