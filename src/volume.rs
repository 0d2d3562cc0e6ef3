//! Master volume mapping.
//!
//! Volume levels are logarithmic (0 = normal, negative = quieter, roughly
//! -1200 for near silence). They are turned into a linear gain and then into
//! a MIDI channel volume (CC7) that is pushed to every channel.

use crate::engine::device::MidiDevice;

/// Divisor applied to the level before exponentiation.
pub const LEVEL_DIVISOR: f64 = 2000.0;

/// Channel volume controller number.
pub const CHANNEL_VOLUME_CC: u8 = 7;

/// Loudest level in the nominal input range.
pub const MAX_LEVEL: i32 = 0;

/// Quietest level in the nominal input range.
pub const MIN_LEVEL: i32 = -1200;

/// Converts a logarithmic level to a linear gain in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use midiloop::volume::level_to_gain;
///
/// assert_eq!(level_to_gain(0), 1.0);
/// assert!((level_to_gain(-600) - 0.501).abs() < 0.001);
/// ```
pub fn level_to_gain(level: i32) -> f32 {
    10f64
        .powf(level as f64 / LEVEL_DIVISOR)
        .clamp(0.0, 1.0) as f32
}

/// Converts a linear gain to a channel volume value (0-127).
pub fn gain_to_channel_volume(gain: f32) -> u8 {
    (gain.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// Converts a level straight to a channel volume value.
pub fn level_to_channel_volume(level: i32) -> u8 {
    gain_to_channel_volume(level_to_gain(level))
}

/// Pushes the channel volume for `level` to every channel of `device`.
///
/// Returns the value that was sent.
pub fn apply_to_channels<D: MidiDevice + ?Sized>(device: &mut D, level: i32) -> u8 {
    let value = level_to_channel_volume(level);
    for channel in 0..device.channel_count() {
        device.set_channel_controller(channel, CHANNEL_VOLUME_CC, value);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_at_reference_levels() {
        assert_eq!(level_to_gain(0), 1.0);
        assert!((level_to_gain(-600) - 0.501_187).abs() < 1e-4);
        assert!((level_to_gain(-2000) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_gain_is_clamped() {
        // Positive levels would amplify; they are capped at unity.
        assert_eq!(level_to_gain(1500), 1.0);
        assert_eq!(level_to_gain(i32::MAX), 1.0);
        let floor = level_to_gain(i32::MIN);
        assert!((0.0..=1.0).contains(&floor));
    }

    #[test]
    fn test_gain_is_monotonic() {
        let mut previous = level_to_gain(MIN_LEVEL - 400);
        for level in (MIN_LEVEL - 400..=400).step_by(25) {
            let gain = level_to_gain(level);
            assert!(gain >= previous, "gain dropped at level {}", level);
            previous = gain;
        }
    }

    #[test]
    fn test_channel_volume_rounds() {
        assert_eq!(level_to_channel_volume(0), 127);
        // 0.501 * 127 = 63.65
        assert_eq!(level_to_channel_volume(-600), 64);
        assert_eq!(gain_to_channel_volume(0.0), 0);
        assert_eq!(gain_to_channel_volume(1.0), 127);
    }
}
