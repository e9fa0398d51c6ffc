// Discrete inputs and outputs of the sensor head.

use hal::gpio::{Pin, Pull};

use hmdscan_algo::diagnostics::{Alarm, IoState};

use super::pinout;

/// Levels of the switch inputs, already inverted to "active = true".
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, defmt::Format)]
pub struct Inputs {
    pub test: bool,
    pub set: bool,
    pub buttons: [bool; 4],
}

pub struct SensorIo {
    test_in: Pin,
    set_in: Pin,
    buttons: [Pin; 4],

    laser: Pin,
    ir_led: Pin,
    signal_out: Pin, // Active low
    alarm_out: Pin,  // Active low
    led_power: Pin,
    led_signal: Pin,
    led_alarm: Pin,
}

fn input_pull_up(pin: &pinout::PinDef) -> Pin {
    let mut p = pin.init();
    p.pull(Pull::Up);
    p
}

impl SensorIo {
    pub fn new() -> Self {
        let mut io = SensorIo {
            test_in: input_pull_up(&pinout::front_panel::TEST_IN),
            set_in: input_pull_up(&pinout::front_panel::SET_IN),
            buttons: [
                input_pull_up(&pinout::front_panel::BTN_A),
                input_pull_up(&pinout::front_panel::BTN_B),
                input_pull_up(&pinout::front_panel::BTN_C),
                input_pull_up(&pinout::front_panel::BTN_D),
            ],

            laser: pinout::sensor::LASER.init(),
            ir_led: pinout::sensor::IR_LED.init(),
            signal_out: pinout::front_panel::OUT_SIGNAL_NEG.init(),
            alarm_out: pinout::front_panel::OUT_ALARM_NEG.init(),
            led_power: pinout::front_panel::LED_POWER.init(),
            led_signal: pinout::front_panel::LED_SIGNAL.init(),
            led_alarm: pinout::front_panel::LED_ALARM.init(),
        };
        io.laser.set_low();
        io.ir_led.set_low();
        io.set_signal(false);
        io.set_alarm(Alarm::None);
        io.led_power.set_high();
        io
    }

    /// Samples the switch inputs (all active low).
    pub fn read_inputs(&self) -> Inputs {
        let mut buttons = [false; 4];
        for (level, pin) in buttons.iter_mut().zip(self.buttons.iter()) {
            *level = pin.is_low();
        }
        Inputs {
            test: self.test_in.is_low(),
            set: self.set_in.is_low(),
            buttons,
        }
    }

    /// Signal output and LED follow the debounced presence.
    pub fn set_signal(&mut self, present: bool) {
        if present {
            self.signal_out.set_low();
            self.led_signal.set_high();
        } else {
            self.signal_out.set_high();
            self.led_signal.set_low();
        }
    }

    pub fn set_alarm(&mut self, alarm: Alarm) {
        // Output high means OK
        if alarm.drives_output() {
            self.alarm_out.set_low();
        } else {
            self.alarm_out.set_high();
        }
        if alarm.lights_led() {
            self.led_alarm.set_high();
        } else {
            self.led_alarm.set_low();
        }
    }

    pub fn set_laser(&mut self, on: bool) {
        if on {
            self.laser.set_high();
        } else {
            self.laser.set_low();
        }
    }

    pub fn set_ir_led(&mut self, on: bool) {
        if on {
            self.ir_led.set_high();
        } else {
            self.ir_led.set_low();
        }
    }

    /// Current pin levels as the register bitmask.
    pub fn state(&self, inputs: &Inputs) -> IoState {
        let [a, b, c, d] = inputs.buttons;
        IoState::default()
            .with(IoState::LASER, self.laser.is_high())
            .with(IoState::IR_LED, self.ir_led.is_high())
            .with(IoState::TEST_INPUT, inputs.test)
            .with(IoState::SET_INPUT, inputs.set)
            .with(IoState::ALARM_OUTPUT, self.alarm_out.is_low())
            .with(IoState::SIGNAL_OUTPUT, self.signal_out.is_low())
            .with(IoState::LED_ALARM, self.led_alarm.is_high())
            .with(IoState::LED_SIGNAL, self.led_signal.is_high())
            .with(IoState::LED_POWER, self.led_power.is_high())
            .with(IoState::BUTTON_A, a)
            .with(IoState::BUTTON_B, b)
            .with(IoState::BUTTON_C, c)
            .with(IoState::BUTTON_D, d)
    }
}
