/// Roulette wheel geometry
///
/// The prize is decided by the server before anything is drawn; the wheel
/// only animates toward the slot it was given.

/// Full turns before the wheel settles
pub const DEFAULT_SPINS: u32 = 5;

/// Clockwise rotation, in degrees, that brings the centre of `prize_index`
/// under a pointer at the top of the wheel.
///
/// Slot 0 starts at 12 o'clock and slots run clockwise.
pub fn wheel_rotation(prize_index: usize, slot_count: usize, spins: u32) -> f64 {
    if slot_count == 0 {
        return 0.0;
    }

    let slot = 360.0 / slot_count as f64;
    let index = prize_index.min(slot_count - 1) as f64;
    let centre = index * slot + slot / 2.0;

    f64::from(spins) * 360.0 + (360.0 - centre)
}

/// Slot under the pointer after rotating the wheel by `rotation` degrees
pub fn slot_at(rotation: f64, slot_count: usize) -> usize {
    if slot_count == 0 {
        return 0;
    }

    let slot = 360.0 / slot_count as f64;
    let angle = (360.0 - rotation.rem_euclid(360.0)).rem_euclid(360.0);
    ((angle / slot).floor() as usize).min(slot_count - 1)
}
