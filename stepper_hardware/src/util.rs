use std::time::Duration;

/// Per-step interval for a commanded speed, where `base` is the interval at
/// full speed (|speed| = 127). `None` for a zero speed, which never moves.
pub fn step_interval(base: Duration, speed: i8) -> Option<Duration> {
    let mag = u32::from(speed.unsigned_abs()).min(127);
    if mag == 0 {
        return None;
    }
    Some(base.saturating_mul(127) / mag)
}

/// Per-step interval for a step/dir driver whose full speed is `max_sps`
/// steps per second.
pub fn gpio_step_interval(max_sps: u32, speed: i8) -> Option<Duration> {
    if max_sps == 0 {
        return None;
    }
    step_interval(Duration::from_nanos(1_000_000_000 / u64::from(max_sps)), speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(127, 100)]
    #[case(-127, 100)]
    #[case(i8::MIN, 100)]
    #[case(1, 12_700)]
    fn interval_scales_inversely_with_speed(#[case] speed: i8, #[case] expected_us: u64) {
        let d = step_interval(Duration::from_micros(100), speed).unwrap();
        assert_eq!(d, Duration::from_micros(expected_us));
    }

    #[test]
    fn zero_speed_has_no_interval() {
        assert_eq!(step_interval(Duration::from_micros(100), 0), None);
        assert_eq!(gpio_step_interval(0, 100), None);
    }

    #[test]
    fn gpio_full_speed_matches_max_sps() {
        let d = gpio_step_interval(1000, 127).unwrap();
        assert_eq!(d, Duration::from_millis(1));
    }
}
