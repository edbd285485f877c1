//! Game clock parsing.
//!
//! Clocks arrive as free text from the odds feed: "7:23 4Q", "12:00 1H",
//! "8:45 2nd", "Q3 5:42". The clock counts *down* within a period, so the
//! fraction elapsed is
//!
//!   ((period − 1) · period_length + (period_length − remaining)) / total
//!
//! clamped to [0, 1].

use crate::league::LeagueProfile;

/// Fraction of regulation elapsed, or `None` if the clock cannot be parsed.
///
/// A clock without a period marker is read as the first period.
pub fn fraction_elapsed(clock: &str, profile: &LeagueProfile) -> Option<f64> {
    let (minutes, seconds) = parse_time_remaining(clock)?;
    let period = match parse_period(clock, profile.periods) {
        Some(Ok(p)) => p,
        Some(Err(())) => return None,
        None => 1,
    };

    let period_length = profile.period_length();
    let remaining = minutes as f64 + seconds as f64 / 60.0;
    let elapsed = (period - 1) as f64 * period_length + (period_length - remaining);
    Some((elapsed / profile.total_minutes).clamp(0.0, 1.0))
}

/// First `MM:SS` group in the text.
fn parse_time_remaining(clock: &str) -> Option<(u32, u32)> {
    let token = clock
        .split(|c: char| !(c.is_ascii_digit() || c == ':'))
        .find(|t| t.contains(':'))?;
    let (mm, ss) = token.split_once(':')?;
    if mm.is_empty() || ss.is_empty() || ss.contains(':') {
        return None;
    }
    let minutes: u32 = mm.parse().ok()?;
    let seconds: u32 = ss.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some((minutes, seconds))
}

/// Period ordinal from markers like "4Q", "4th", "2H", "2nd", "Q3", "OT".
///
/// `None` when no marker is present, `Some(Err)` when a marker is malformed
/// (period 0, or a number with an unknown suffix such as "4x").
fn parse_period(clock: &str, periods: u32) -> Option<Result<u32, ()>> {
    let lower = clock.to_lowercase();
    for token in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.is_empty() || token.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let digits_end = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (digits, suffix) = token.split_at(digits_end);

        // "OT", "2OT", "OT2": past regulation; the clamp pins it to 1.0.
        if suffix
            .strip_prefix("ot")
            .is_some_and(|rest| rest.bytes().all(|b| b.is_ascii_digit()))
        {
            return Some(Ok(periods + 1));
        }

        let number = if !digits.is_empty() {
            match suffix {
                "q" | "qtr" | "h" | "st" | "nd" | "rd" | "th" => digits.parse::<u32>().ok(),
                // A number with an unrecognised suffix is a marker we cannot read.
                _ => return Some(Err(())),
            }
        } else {
            token
                .strip_prefix('q')
                .or_else(|| token.strip_prefix('h'))
                .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|rest| rest.parse::<u32>().ok())
        };

        match number {
            Some(0) => return Some(Err(())),
            Some(n) => return Some(Ok(n)),
            None => continue,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::LeagueTable;
    use approx::assert_relative_eq;

    fn nba() -> LeagueProfile {
        LeagueTable::default().get("NBA").unwrap().clone()
    }

    fn cbb() -> LeagueProfile {
        LeagueTable::default().get("CBB").unwrap().clone()
    }

    #[test]
    fn start_and_end_of_game() {
        assert_eq!(fraction_elapsed("12:00 1Q", &nba()), Some(0.0));
        assert_eq!(fraction_elapsed("0:00 4Q", &nba()), Some(1.0));
    }

    #[test]
    fn mid_second_quarter() {
        // 12 + (12 − 6) = 18 of 48 minutes
        assert_relative_eq!(
            fraction_elapsed("6:00 2Q", &nba()).unwrap(),
            0.375,
            epsilon = 1e-12
        );
    }

    #[test]
    fn marker_styles_are_equivalent() {
        let p = nba();
        let expected = fraction_elapsed("7:23 4Q", &p).unwrap();
        for text in ["7:23 4th", "4TH 7:23", "Q4 7:23", "7:23 4qtr"] {
            assert_relative_eq!(fraction_elapsed(text, &p).unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn halves_for_college() {
        // 20 + (20 − 10) = 30 of 40 minutes
        assert_relative_eq!(
            fraction_elapsed("10:00 2H", &cbb()).unwrap(),
            0.75,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            fraction_elapsed("10:00 2nd", &cbb()).unwrap(),
            0.75,
            epsilon = 1e-12
        );
    }

    #[test]
    fn missing_marker_defaults_to_first_period() {
        assert_relative_eq!(
            fraction_elapsed("9:00", &nba()).unwrap(),
            3.0 / 48.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(fraction_elapsed("15:00 1Q", &nba()), Some(0.0));
        assert_eq!(fraction_elapsed("2:00 OT", &nba()), Some(1.0));
    }

    #[test]
    fn numbered_overtime_is_past_regulation() {
        let p = nba();
        for text in ["3:00 2OT", "3:00 OT2", "4:00 1OT", "2ot 0:45"] {
            assert_eq!(fraction_elapsed(text, &p), Some(1.0), "{:?}", text);
        }
        assert_eq!(fraction_elapsed("3:00 2OT", &cbb()), Some(1.0));
    }

    #[test]
    fn parse_failures_are_undefined() {
        let p = nba();
        for text in [
            "",
            "halftime",
            "7: 4Q",
            ":30 4Q",
            "7:75 4Q",
            "7:23:10 4Q",
            "5:00 0Q",
            "5:00 4x",
            "5:00 3per",
        ] {
            assert_eq!(fraction_elapsed(text, &p), None, "{:?}", text);
        }
    }
}
