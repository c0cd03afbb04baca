use std::time::Duration;

/// Renders a duration as `H:MM:SS[.ffffff]`, prefixed with the day count
/// for durations longer than a day.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let micros = elapsed.subsec_micros();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    let mut out = String::new();
    if days > 0 {
        let unit = if days == 1 { "day" } else { "days" };
        out.push_str(&format!("{days} {unit}, "));
    }
    out.push_str(&format!("{hours}:{minutes:02}:{seconds:02}"));
    if micros > 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_a_clock() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3_723)), "1:02:03");
        assert_eq!(format_elapsed(Duration::from_micros(1_500_000)), "0:00:01.500000");
        assert_eq!(format_elapsed(Duration::from_secs(90_061)), "1 day, 1:01:01");
    }
}
