use log::warn;

use crate::ht1621::SegmentBuffer;
use crate::types::{ClockTime, DayOfWeek, Scene, WindSpeed, WorkMode};

pub const TEMP_MIN_C: f32 = -99.9;
pub const TEMP_MAX_C: f32 = 99.9;

// Byte 1.
pub const WARNING_MASK: u8 = 0x01;
pub const MODE_AUTO_MASK: u8 = 0x02;
pub const CELSIUS_MASK: u8 = 0x08;
pub const VALVE_MASK: u8 = 0x10;
pub const MODE_DRY_MASK: u8 = 0x20;

// Bytes 2..=4 are the three temperature digit cells; bit 0 of each carries
// something else (scene icons on 2 and 3, the decimal point on 4).
pub const SCENE_OUTDOOR_MASK: u8 = 0x01;
pub const SCENE_SLEEP_MASK: u8 = 0x01;
pub const DECIMAL_POINT_MASK: u8 = 0x01;

// Byte 5.
pub const WEEKDAY_MON_MASK: u8 = 0x01;
pub const HOUSE_MASK: u8 = 0x06;
pub const ALARM_MASK: u8 = 0x08;
pub const WEEKDAY_TUE_MASK: u8 = 0x10;
pub const WEEKDAY_WED_MASK: u8 = 0x20;
pub const WEEKDAY_THU_MASK: u8 = 0x40;
pub const WEEKDAY_FRI_MASK: u8 = 0x80;

// Byte 6: colon and weekend icons share the hour-ones cell's byte.
pub const CLOCK_COLON_MASK: u8 = 0x02;
pub const WEEKDAY_SUN_MASK: u8 = 0x04;
pub const WEEKDAY_SAT_MASK: u8 = 0x08;

// Bytes 7 and 8: minute digit cells; bit 0 is an always-on bar of the cell.
pub const MINUTE_CELL_BASE: u8 = 0x01;

// Byte 15.
pub const LOCK_MASK: u8 = 0x10;
pub const MODE_WIND_MASK: u8 = 0x20;
pub const SPEED_HIGH_BAR_MASK: u8 = 0x40;

// Byte 16.
pub const MODE_HEAT_MASK: u8 = 0x02;
pub const SPEED_LOW_MASK: u8 = 0x04;
pub const MODE_COLD_MASK: u8 = 0x10;
pub const FAN_LOGO_MASK: u8 = 0x20;
pub const SPEED_MID_MASK: u8 = 0x44;
pub const SPEED_AUTO_MASK: u8 = 0x80;

const MODE_B1_MASK: u8 = MODE_AUTO_MASK | MODE_DRY_MASK;
const MODE_B16_MASK: u8 = MODE_HEAT_MASK | MODE_COLD_MASK;
const SPEED_B16_MASK: u8 = SPEED_AUTO_MASK | SPEED_MID_MASK;

/// Seven-segment glyph for an ASCII digit. Anything else renders blank,
/// which is how a leading minus sign disappears.
pub fn glyph(c: char) -> u8 {
    match c {
        '0' => 0xFA,
        '1' => 0x60,
        '2' => 0xD6,
        '3' => 0xF4,
        '4' => 0x6C,
        '5' => 0xBC,
        '6' => 0xBE,
        '7' => 0xE0,
        '8' => 0xFE,
        '9' => 0xFC,
        _ => 0x00,
    }
}

/// Reverse lookup for diagnostics and the simulator readout. Blank decodes
/// to a space; an unknown segment pattern to `None`.
pub fn glyph_digit(glyph: u8) -> Option<char> {
    match glyph {
        0x00 => Some(' '),
        0xFA => Some('0'),
        0x60 => Some('1'),
        0xD6 => Some('2'),
        0xF4 => Some('3'),
        0x6C => Some('4'),
        0xBC => Some('5'),
        0xBE => Some('6'),
        0xE0 => Some('7'),
        0xFE => Some('8'),
        0xFC => Some('9'),
        _ => None,
    }
}

/// Paints a temperature into the three digit cells. The value is shown in
/// tenths, truncated toward zero and zero-padded to three places, so 23.4
/// lights "234" behind the fixed decimal point.
pub fn set_temperature(buffer: &mut SegmentBuffer, celsius: f32) {
    let mut value = celsius;
    if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&value) {
        warn!("temperature {value} outside displayable range, clamping");
        value = value.clamp(TEMP_MIN_C, TEMP_MAX_C);
    }
    let tenths = (value * 10.0) as i16;
    let text = format!("{tenths:03}");
    for (addr, c) in (2usize..=4).zip(text.chars()) {
        buffer.set(addr, (buffer.get(addr) & 0x01) | glyph(c));
    }
}

pub fn clear_temperature(buffer: &mut SegmentBuffer) {
    buffer.set(2, buffer.get(2) & 0x01);
    buffer.set(3, buffer.get(3) & 0x01);
    buffer.set(4, 0);
}

/// Paints the clock area: colon, two minute cells, the split hour cells and
/// the weekday icon row. The hour glyph is scattered across bytes 6, 14 and
/// 15 by the glass routing.
pub fn set_time(buffer: &mut SegmentBuffer, time: ClockTime) {
    let mut b6 = buffer.get(6) | CLOCK_COLON_MASK;

    buffer.set(7, MINUTE_CELL_BASE | glyph(digit(time.minute / 10)));
    buffer.set(8, MINUTE_CELL_BASE | glyph(digit(time.minute % 10)));

    let hour_low = glyph(digit(time.hour % 10));
    let hour_high = glyph(digit(time.hour / 10));
    b6 = (b6 & 0x0F) | (hour_low & 0xF0);
    buffer.set(14, (hour_low & 0x0E) | (hour_high & 0xF0));
    buffer.set(15, (buffer.get(15) & 0xF1) | (hour_high & 0x0E));

    let mut b5 = buffer.get(5) & (HOUSE_MASK | ALARM_MASK);
    b6 &= !(WEEKDAY_SAT_MASK | WEEKDAY_SUN_MASK);
    match time.day {
        DayOfWeek::Mon => b5 |= WEEKDAY_MON_MASK,
        DayOfWeek::Tue => b5 |= WEEKDAY_TUE_MASK,
        DayOfWeek::Wed => b5 |= WEEKDAY_WED_MASK,
        DayOfWeek::Thu => b5 |= WEEKDAY_THU_MASK,
        DayOfWeek::Fri => b5 |= WEEKDAY_FRI_MASK,
        DayOfWeek::Sat => b6 |= WEEKDAY_SAT_MASK,
        DayOfWeek::Sun => b6 |= WEEKDAY_SUN_MASK,
    }
    buffer.set(5, b5);
    buffer.set(6, b6);
}

pub fn clear_time(buffer: &mut SegmentBuffer) {
    buffer.set(5, buffer.get(5) & (HOUSE_MASK | ALARM_MASK));
    buffer.set(6, 0);
    buffer.set(7, 0);
    buffer.set(8, 0);
    buffer.set(14, 0);
    buffer.set(15, buffer.get(15) & 0xF0);
}

pub fn set_work_mode(buffer: &mut SegmentBuffer, mode: WorkMode) {
    let mut b1 = buffer.get(1) & !MODE_B1_MASK;
    let mut b15 = buffer.get(15) & !MODE_WIND_MASK;
    let mut b16 = buffer.get(16) & !MODE_B16_MASK;
    match mode {
        WorkMode::Auto => b1 |= MODE_AUTO_MASK,
        WorkMode::Cold => b16 |= MODE_COLD_MASK,
        WorkMode::Heat => b16 |= MODE_HEAT_MASK,
        WorkMode::Wind => b15 |= MODE_WIND_MASK,
        WorkMode::Dry => b1 |= MODE_DRY_MASK,
    }
    buffer.set(1, b1);
    buffer.set(15, b15);
    buffer.set(16, b16);
}

/// The speed bars stack on the glass, so the encodings are cumulative and
/// the high bar lives in a different byte than the rest.
pub fn set_wind_speed(buffer: &mut SegmentBuffer, speed: WindSpeed) {
    let mut b15 = buffer.get(15);
    let mut b16 = buffer.get(16);
    if speed == WindSpeed::High {
        b15 |= SPEED_HIGH_BAR_MASK;
        b16 = (b16 & !SPEED_AUTO_MASK) | SPEED_MID_MASK;
    } else {
        b15 &= !SPEED_HIGH_BAR_MASK;
        b16 &= !SPEED_B16_MASK;
        match speed {
            WindSpeed::Auto => b16 |= SPEED_AUTO_MASK,
            WindSpeed::Mid => b16 |= SPEED_MID_MASK,
            WindSpeed::Low => b16 |= SPEED_LOW_MASK,
            WindSpeed::High => {}
        }
    }
    buffer.set(15, b15);
    buffer.set(16, b16);
}

pub fn set_scene(buffer: &mut SegmentBuffer, scene: Scene) {
    let mut b2 = buffer.get(2) & !SCENE_OUTDOOR_MASK;
    let mut b3 = buffer.get(3) & !SCENE_SLEEP_MASK;
    match scene {
        Scene::None => {}
        Scene::Outdoor => b2 |= SCENE_OUTDOOR_MASK,
        Scene::Sleep => b3 |= SCENE_SLEEP_MASK,
    }
    buffer.set(2, b2);
    buffer.set(3, b3);
}

pub fn set_warning(buffer: &mut SegmentBuffer, on: bool) {
    set_icon(buffer, 1, WARNING_MASK, on);
}

pub fn set_valve(buffer: &mut SegmentBuffer, on: bool) {
    set_icon(buffer, 1, VALVE_MASK, on);
}

pub fn set_house(buffer: &mut SegmentBuffer, on: bool) {
    set_icon(buffer, 5, HOUSE_MASK, on);
}

pub fn set_alarm(buffer: &mut SegmentBuffer, on: bool) {
    set_icon(buffer, 5, ALARM_MASK, on);
}

pub fn set_lock(buffer: &mut SegmentBuffer, on: bool) {
    set_icon(buffer, 15, LOCK_MASK, on);
}

/// Fixed furniture: the °C unit, the temperature decimal point and the fan
/// logo stay lit whenever the panel is on.
pub fn set_defaults(buffer: &mut SegmentBuffer) {
    buffer.set(1, buffer.get(1) | CELSIUS_MASK);
    buffer.set(4, buffer.get(4) | DECIMAL_POINT_MASK);
    buffer.set(16, buffer.get(16) | FAN_LOGO_MASK);
}

fn set_icon(buffer: &mut SegmentBuffer, addr: usize, mask: u8, on: bool) {
    let byte = buffer.get(addr);
    buffer.set(addr, if on { byte | mask } else { byte & !mask });
}

fn digit(n: u8) -> char {
    char::from(b'0' + n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filled(byte: u8) -> SegmentBuffer {
        let mut buffer = SegmentBuffer::new();
        for addr in 0..crate::ht1621::BUFFER_LEN {
            buffer.set(addr, byte);
        }
        buffer
    }

    #[test]
    fn field_masks_within_a_byte_are_disjoint() {
        let byte1 = [
            WARNING_MASK,
            MODE_AUTO_MASK | MODE_DRY_MASK,
            CELSIUS_MASK,
            VALVE_MASK,
        ];
        let byte5 = [
            WEEKDAY_MON_MASK
                | WEEKDAY_TUE_MASK
                | WEEKDAY_WED_MASK
                | WEEKDAY_THU_MASK
                | WEEKDAY_FRI_MASK,
            HOUSE_MASK,
            ALARM_MASK,
        ];
        // 0xF0 is the hour-ones glyph nibble, 0x0E the hour-tens glyph bits.
        let byte6 = [CLOCK_COLON_MASK, WEEKDAY_SAT_MASK | WEEKDAY_SUN_MASK, 0xF0];
        let byte15 = [0x0E, LOCK_MASK, MODE_WIND_MASK, SPEED_HIGH_BAR_MASK];
        let byte16 = [
            MODE_HEAT_MASK | MODE_COLD_MASK,
            SPEED_B16_MASK,
            FAN_LOGO_MASK,
        ];
        for fields in [
            byte1.as_slice(),
            byte5.as_slice(),
            byte6.as_slice(),
            byte15.as_slice(),
            byte16.as_slice(),
        ] {
            for (i, a) in fields.iter().enumerate() {
                for b in &fields[i + 1..] {
                    assert_eq!(a & b, 0, "masks {a:#04x} and {b:#04x} overlap");
                }
            }
        }
    }

    #[test]
    fn temperature_digits_land_in_cells_two_to_four() {
        let mut buffer = SegmentBuffer::new();
        set_temperature(&mut buffer, 23.4);
        assert_eq!(buffer.get(2), glyph('2'));
        assert_eq!(buffer.get(3), glyph('3'));
        assert_eq!(buffer.get(4), glyph('4'));
    }

    #[test]
    fn temperature_preserves_low_bits_of_digit_cells() {
        let mut buffer = SegmentBuffer::new();
        set_scene(&mut buffer, Scene::Outdoor);
        set_defaults(&mut buffer);
        set_temperature(&mut buffer, 23.4);
        assert_eq!(buffer.get(2), glyph('2') | SCENE_OUTDOOR_MASK);
        assert_eq!(buffer.get(3), glyph('3'));
        assert_eq!(buffer.get(4), glyph('4') | DECIMAL_POINT_MASK);
    }

    #[test]
    fn out_of_range_temperature_clamps_to_boundary() {
        let mut hot = SegmentBuffer::new();
        set_temperature(&mut hot, 150.0);
        let mut max = SegmentBuffer::new();
        set_temperature(&mut max, 99.9);
        assert_eq!(hot, max);

        let mut cold = SegmentBuffer::new();
        set_temperature(&mut cold, -150.0);
        let mut min = SegmentBuffer::new();
        set_temperature(&mut min, -99.9);
        assert_eq!(cold, min);
    }

    #[test]
    fn negative_temperature_blanks_the_sign_cell() {
        let mut buffer = SegmentBuffer::new();
        set_temperature(&mut buffer, -5.0);
        // -50 formats as "-50"; the minus maps to a blank glyph.
        assert_eq!(buffer.get(2), 0);
        assert_eq!(buffer.get(3), glyph('5'));
        assert_eq!(buffer.get(4), glyph('0'));
    }

    #[test]
    fn clear_temperature_keeps_scene_bits_only() {
        let mut buffer = filled(0xFF);
        clear_temperature(&mut buffer);
        assert_eq!(buffer.get(2), 0x01);
        assert_eq!(buffer.get(3), 0x01);
        assert_eq!(buffer.get(4), 0x00);
    }

    #[test]
    fn time_paints_colon_minutes_and_split_hour() {
        let mut buffer = SegmentBuffer::new();
        set_time(
            &mut buffer,
            ClockTime {
                hour: 12,
                minute: 34,
                day: DayOfWeek::Mon,
            },
        );
        assert_eq!(buffer.get(7), MINUTE_CELL_BASE | glyph('3'));
        assert_eq!(buffer.get(8), MINUTE_CELL_BASE | glyph('4'));
        let h_low = glyph('2');
        let h_high = glyph('1');
        assert_eq!(buffer.get(6), CLOCK_COLON_MASK | (h_low & 0xF0));
        assert_eq!(buffer.get(14), (h_low & 0x0E) | (h_high & 0xF0));
        assert_eq!(buffer.get(15), h_high & 0x0E);
        assert_eq!(buffer.get(5), WEEKDAY_MON_MASK);
    }

    #[test]
    fn weekend_icons_live_in_byte_six() {
        let mut buffer = SegmentBuffer::new();
        set_time(
            &mut buffer,
            ClockTime {
                hour: 0,
                minute: 0,
                day: DayOfWeek::Sat,
            },
        );
        assert_eq!(buffer.get(5), 0);
        assert_ne!(buffer.get(6) & WEEKDAY_SAT_MASK, 0);

        set_time(
            &mut buffer,
            ClockTime {
                hour: 0,
                minute: 0,
                day: DayOfWeek::Sun,
            },
        );
        assert_eq!(buffer.get(6) & WEEKDAY_SAT_MASK, 0);
        assert_ne!(buffer.get(6) & WEEKDAY_SUN_MASK, 0);
    }

    #[test]
    fn switching_weekday_clears_the_previous_icon() {
        let mut buffer = SegmentBuffer::new();
        let noon = |day| ClockTime {
            hour: 12,
            minute: 0,
            day,
        };
        set_time(&mut buffer, noon(DayOfWeek::Fri));
        assert_ne!(buffer.get(5) & WEEKDAY_FRI_MASK, 0);
        set_time(&mut buffer, noon(DayOfWeek::Tue));
        assert_eq!(buffer.get(5) & WEEKDAY_FRI_MASK, 0);
        assert_ne!(buffer.get(5) & WEEKDAY_TUE_MASK, 0);
    }

    #[test]
    fn time_leaves_house_and_alarm_alone() {
        let mut buffer = SegmentBuffer::new();
        set_house(&mut buffer, true);
        set_alarm(&mut buffer, true);
        set_time(
            &mut buffer,
            ClockTime {
                hour: 8,
                minute: 15,
                day: DayOfWeek::Wed,
            },
        );
        assert_ne!(buffer.get(5) & HOUSE_MASK, 0);
        assert_ne!(buffer.get(5) & ALARM_MASK, 0);
        clear_time(&mut buffer);
        assert_eq!(buffer.get(5), HOUSE_MASK | ALARM_MASK);
    }

    #[test]
    fn clear_time_blanks_the_clock_area() {
        let mut buffer = filled(0xFF);
        clear_time(&mut buffer);
        assert_eq!(buffer.get(5), 0x0E);
        assert_eq!(buffer.get(6), 0);
        assert_eq!(buffer.get(7), 0);
        assert_eq!(buffer.get(8), 0);
        assert_eq!(buffer.get(14), 0);
        assert_eq!(buffer.get(15), 0xF0);
    }

    #[test]
    fn mode_change_clears_the_previous_mode_segment() {
        let mut buffer = SegmentBuffer::new();
        set_work_mode(&mut buffer, WorkMode::Auto);
        assert_ne!(buffer.get(1) & MODE_AUTO_MASK, 0);
        set_work_mode(&mut buffer, WorkMode::Cold);
        assert_eq!(buffer.get(1) & MODE_AUTO_MASK, 0);
        assert_ne!(buffer.get(16) & MODE_COLD_MASK, 0);
        set_work_mode(&mut buffer, WorkMode::Wind);
        assert_eq!(buffer.get(16) & MODE_COLD_MASK, 0);
        assert_ne!(buffer.get(15) & MODE_WIND_MASK, 0);
    }

    #[test]
    fn high_speed_stacks_bars_and_drops_auto() {
        let mut buffer = SegmentBuffer::new();
        set_wind_speed(&mut buffer, WindSpeed::Auto);
        assert_ne!(buffer.get(16) & SPEED_AUTO_MASK, 0);
        set_wind_speed(&mut buffer, WindSpeed::High);
        assert_eq!(buffer.get(16) & SPEED_AUTO_MASK, 0);
        assert_eq!(buffer.get(16) & SPEED_MID_MASK, SPEED_MID_MASK);
        assert_ne!(buffer.get(15) & SPEED_HIGH_BAR_MASK, 0);
        set_wind_speed(&mut buffer, WindSpeed::Low);
        assert_eq!(buffer.get(15) & SPEED_HIGH_BAR_MASK, 0);
        assert_eq!(buffer.get(16) & SPEED_B16_MASK, SPEED_LOW_MASK);
    }

    #[test]
    fn speed_leaves_mode_and_logo_bits_alone() {
        let mut buffer = SegmentBuffer::new();
        set_defaults(&mut buffer);
        set_work_mode(&mut buffer, WorkMode::Heat);
        for speed in [WindSpeed::Auto, WindSpeed::Low, WindSpeed::Mid, WindSpeed::High] {
            set_wind_speed(&mut buffer, speed);
            assert_ne!(buffer.get(16) & MODE_HEAT_MASK, 0, "{speed:?}");
            assert_ne!(buffer.get(16) & FAN_LOGO_MASK, 0, "{speed:?}");
        }
    }

    #[test]
    fn scene_icons_ride_digit_cell_low_bits() {
        let mut buffer = SegmentBuffer::new();
        set_temperature(&mut buffer, 26.0);
        set_scene(&mut buffer, Scene::Sleep);
        assert_eq!(buffer.get(2), glyph('2'));
        assert_eq!(buffer.get(3), glyph('6') | SCENE_SLEEP_MASK);
        set_scene(&mut buffer, Scene::None);
        assert_eq!(buffer.get(3), glyph('6'));
    }

    #[test]
    fn icon_setters_touch_only_their_mask() {
        let mut buffer = filled(0x00);
        set_valve(&mut buffer, true);
        set_warning(&mut buffer, true);
        assert_eq!(buffer.get(1), VALVE_MASK | WARNING_MASK);
        set_valve(&mut buffer, false);
        assert_eq!(buffer.get(1), WARNING_MASK);

        set_lock(&mut buffer, true);
        assert_eq!(buffer.get(15), LOCK_MASK);
        set_lock(&mut buffer, false);
        assert_eq!(buffer.get(15), 0);
    }

    #[test]
    fn glyphs_round_trip_through_reverse_lookup() {
        for c in "0123456789".chars() {
            assert_eq!(glyph_digit(glyph(c)), Some(c));
        }
        assert_eq!(glyph_digit(0x00), Some(' '));
        assert_eq!(glyph_digit(0x13), None);
    }
}
