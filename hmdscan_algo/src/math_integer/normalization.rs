/// Linearly maps `value` from one integer range onto another (truncating toward zero).
///
/// # Arguments
/// * `value` - Input value, expected inside `[in_min, in_max]`
/// * `in_min`, `in_max` - Input range; a degenerate range maps everything to `out_min`
/// * `out_min`, `out_max` - Output range
///
/// # Returns
/// The remapped value [i32]
pub const fn remap(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_max == in_min {
        return out_min;
    }
    // i64 keeps value * span inside range for 16-bit outputs
    let scaled = (value - in_min) as i64 * (out_max - out_min) as i64 / (in_max - in_min) as i64;
    scaled as i32 + out_min
}

/// Limits `value` to `[min, max]`.
pub const fn constrain(value: i32, min: i32, max: i32) -> i32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
