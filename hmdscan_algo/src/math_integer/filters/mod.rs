pub mod debounce;
pub mod moving_average;
