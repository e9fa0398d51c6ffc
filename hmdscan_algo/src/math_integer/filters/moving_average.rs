// Approximate moving average over `period` samples, fixed-point.
pub struct FilterMovingAverage {
    period: u16, // Averaging length (0 = pass-through)
    output: u16,
    temp: u32, // Stores scaled average (value << 16)
}

impl FilterMovingAverage {
    /// Constructor to initialize the filter with its averaging length
    pub fn new(period: u16) -> FilterMovingAverage {
        FilterMovingAverage {
            period,
            output: 0,
            temp: 0,
        }
    }

    /// Math call: avg = avg * (p - 1) / p + input / p
    pub fn tick(&mut self, input: u16) -> u16 {
        let current: u32 = (input as u32) << 16;

        if self.period == 0 {
            self.temp = current;
        } else {
            let p = self.period as u64;
            // u64 keeps avg * (p - 1) from overflowing for p up to 9999
            self.temp = ((self.temp as u64 * (p - 1) + current as u64) / p) as u32;
        }

        self.output = (self.temp >> 16) as u16;
        self.output
    }

    /// Clears the accumulator; the average climbs again from zero
    pub fn reset(&mut self) {
        self.temp = 0;
        self.output = 0;
    }

    /// Function to retrieve the output value
    pub fn get_output(&self) -> u16 {
        self.output
    }

    /// Changes the averaging length, keeping the current average
    pub fn set_period(&mut self, period: u16) {
        self.period = period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_one_follows_input() {
        let mut filter = FilterMovingAverage::new(1);
        for input in [10, 900, 0, 455] {
            assert_eq!(filter.tick(input), input);
        }
    }

    #[test]
    fn period_zero_is_pass_through() {
        let mut filter = FilterMovingAverage::new(0);
        assert_eq!(filter.tick(700), 700);
        assert_eq!(filter.tick(100), 100);
    }

    #[test]
    fn climbs_from_zero_toward_input() {
        let mut filter = FilterMovingAverage::new(4);
        assert_eq!(filter.tick(400), 100);
        assert_eq!(filter.tick(400), 175);
        assert_eq!(filter.tick(800), 331);
        assert_eq!(filter.get_output(), 331);
    }

    #[test]
    fn reset_clears_history() {
        let mut filter = FilterMovingAverage::new(2);
        filter.tick(1000);
        filter.tick(1000);
        filter.reset();
        assert_eq!(filter.get_output(), 0);
        assert_eq!(filter.tick(640), 320);
    }
}
