//! Built-in formula functions.
//!
//! Two families: time-series functions walk each symbol's column with a
//! rolling window (NaN anywhere in the window poisons that output, the
//! same policy the daily indicators in this codebase family use), and
//! cross-sectional functions work date by date across symbols, honoring
//! an optional index-membership mask.

use crate::frame::FieldFrame;

/// Canonical (lowercase) names of every built-in function and constant.
///
/// Lookup is case-insensitive, so `rank`, `Rank`, and `RANK` all resolve
/// to the same built-in; custom function names are checked against this
/// list (plus the constants) at registration time.
const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs",
    "log",
    "sign",
    "sqrt",
    "min",
    "max",
    "if",
    "delay",
    "delta",
    "ts_sum",
    "ts_mean",
    "ts_std",
    "ts_min",
    "ts_max",
    "rank",
    "standardize",
];

const CONSTANTS: &[&str] = &["pi", "e"];

/// True when `name` (any casing) is a built-in function or constant.
pub fn is_builtin_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    BUILTIN_FUNCTIONS.contains(&lower.as_str()) || CONSTANTS.contains(&lower.as_str())
}

/// Shift each symbol's series forward by `n` observations.
pub fn delay(frame: &FieldFrame, n: usize) -> FieldFrame {
    let mut out = FieldFrame::filled(
        frame.dates().to_vec(),
        frame.symbols().to_vec(),
        f64::NAN,
    );
    for di in n..frame.n_dates() {
        for si in 0..frame.n_symbols() {
            out.set(di, si, frame.get(di - n, si));
        }
    }
    out
}

/// `x - Delay(x, n)`.
pub fn delta(frame: &FieldFrame, n: usize) -> FieldFrame {
    frame.zip_with(&delay(frame, n), |a, b| a - b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollStat {
    Sum,
    Mean,
    Std,
    Min,
    Max,
}

/// Rolling statistic over a window of `n` observations ending at each
/// date. The first `n - 1` outputs are NaN, as is any window containing
/// a NaN. `Std` is the sample standard deviation and needs `n >= 2`.
pub fn rolling(frame: &FieldFrame, n: usize, stat: RollStat) -> FieldFrame {
    let mut out = FieldFrame::filled(
        frame.dates().to_vec(),
        frame.symbols().to_vec(),
        f64::NAN,
    );
    if n == 0 || frame.n_dates() < n {
        return out;
    }

    for si in 0..frame.n_symbols() {
        let column = frame.column(si);
        for di in (n - 1)..column.len() {
            let window = &column[di + 1 - n..=di];
            if window.iter().any(|v| v.is_nan()) {
                continue;
            }
            let value = match stat {
                RollStat::Sum => window.iter().sum(),
                RollStat::Mean => window.iter().sum::<f64>() / n as f64,
                RollStat::Std => {
                    if n < 2 {
                        f64::NAN
                    } else {
                        let mean = window.iter().sum::<f64>() / n as f64;
                        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                            / (n - 1) as f64;
                        var.sqrt()
                    }
                }
                RollStat::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
                RollStat::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            out.set(di, si, value);
        }
    }
    out
}

fn included(mask: Option<&FieldFrame>, di: usize, si: usize) -> bool {
    match mask {
        None => true,
        Some(mask) => mask.get(di, si) == 1.0,
    }
}

/// Cross-sectional percentile rank in `(0, 1]`, date by date.
///
/// NaN values and symbols excluded by the mask do not participate in the
/// ranking and come out NaN; ties get their average rank (so a constant
/// cross-section ranks at the midpoint).
pub fn cs_rank(frame: &FieldFrame, mask: Option<&FieldFrame>) -> FieldFrame {
    let mut out = FieldFrame::filled(
        frame.dates().to_vec(),
        frame.symbols().to_vec(),
        f64::NAN,
    );

    for di in 0..frame.n_dates() {
        let mut participants: Vec<(usize, f64)> = (0..frame.n_symbols())
            .filter(|si| included(mask, di, *si))
            .map(|si| (si, frame.get(di, si)))
            .filter(|(_, v)| !v.is_nan())
            .collect();
        if participants.is_empty() {
            continue;
        }
        participants.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let count = participants.len() as f64;
        let mut i = 0;
        while i < participants.len() {
            // span of ties shares the average of their 1-based positions
            let mut j = i;
            while j + 1 < participants.len() && participants[j + 1].1 == participants[i].1 {
                j += 1;
            }
            let avg_rank = ((i + 1 + j + 1) as f64) / 2.0;
            for (si, _) in &participants[i..=j] {
                out.set(di, *si, avg_rank / count);
            }
            i = j + 1;
        }
    }
    out
}

/// Cross-sectional z-score, date by date, over unmasked non-NaN symbols.
pub fn cs_standardize(frame: &FieldFrame, mask: Option<&FieldFrame>) -> FieldFrame {
    let mut out = FieldFrame::filled(
        frame.dates().to_vec(),
        frame.symbols().to_vec(),
        f64::NAN,
    );

    for di in 0..frame.n_dates() {
        let participants: Vec<(usize, f64)> = (0..frame.n_symbols())
            .filter(|si| included(mask, di, *si))
            .map(|si| (si, frame.get(di, si)))
            .filter(|(_, v)| !v.is_nan())
            .collect();
        if participants.len() < 2 {
            continue;
        }
        let n = participants.len() as f64;
        let mean = participants.iter().map(|(_, v)| v).sum::<f64>() / n;
        let var = participants
            .iter()
            .map(|(_, v)| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let std = var.sqrt();
        if std == 0.0 {
            continue;
        }
        for (si, v) in participants {
            out.set(di, si, (v - mean) / std);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn frame(values: &[f64], n_symbols: usize) -> FieldFrame {
        let n_dates = values.len() / n_symbols;
        let dates: Vec<NaiveDate> = (0..n_dates)
            .map(|i| {
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
            })
            .collect();
        let symbols: Vec<String> = (0..n_symbols).map(|i| format!("S{i}")).collect();
        FieldFrame::from_values(dates, symbols, values.to_vec())
    }

    #[test]
    fn delay_shifts_and_pads() {
        let f = frame(&[1.0, 2.0, 3.0, 4.0], 1);
        let d = delay(&f, 2);
        assert!(d.get(0, 0).is_nan());
        assert!(d.get(1, 0).is_nan());
        assert_eq!(d.get(2, 0), 1.0);
        assert_eq!(d.get(3, 0), 2.0);
    }

    #[test]
    fn delta_is_difference() {
        let f = frame(&[1.0, 3.0, 6.0], 1);
        let d = delta(&f, 1);
        assert!(d.get(0, 0).is_nan());
        assert_eq!(d.get(1, 0), 2.0);
        assert_eq!(d.get(2, 0), 3.0);
    }

    #[test]
    fn rolling_mean_with_nan_poisoning() {
        let f = frame(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 1);
        let m = rolling(&f, 2, RollStat::Mean);
        assert!(m.get(0, 0).is_nan());
        assert_eq!(m.get(1, 0), 10.5);
        assert!(m.get(2, 0).is_nan());
        assert!(m.get(3, 0).is_nan());
        assert_eq!(m.get(4, 0), 13.5);
        assert_eq!(m.get(5, 0), 14.5);
    }

    #[test]
    fn rolling_std_is_sample_std() {
        let f = frame(&[1.0, 2.0, 3.0, 4.0], 1);
        let s = rolling(&f, 3, RollStat::Std);
        assert!((s.get(2, 0) - 1.0).abs() < 1e-12);
        assert!((s.get(3, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rank_is_percentile_with_ties_averaged() {
        // one date, four symbols: 1, 2, 2, 4
        let f = frame(&[1.0, 2.0, 2.0, 4.0], 4);
        let r = cs_rank(&f, None);
        assert_eq!(r.get(0, 0), 0.25);
        assert_eq!(r.get(0, 1), 0.625); // (2+3)/2 / 4
        assert_eq!(r.get(0, 2), 0.625);
        assert_eq!(r.get(0, 3), 1.0);
    }

    #[test]
    fn rank_respects_mask_and_nan() {
        let f = frame(&[1.0, 2.0, f64::NAN, 4.0], 4);
        let mask = frame(&[1.0, 1.0, 1.0, 0.0], 4);
        let r = cs_rank(&f, Some(&mask));
        assert_eq!(r.get(0, 0), 0.5);
        assert_eq!(r.get(0, 1), 1.0);
        assert!(r.get(0, 2).is_nan(), "NaN input stays NaN");
        assert!(r.get(0, 3).is_nan(), "masked-out symbol gets no rank");
    }

    #[test]
    fn standardize_centers_and_scales() {
        let f = frame(&[1.0, 2.0, 3.0], 3);
        let z = cs_standardize(&f, None);
        assert!((z.get(0, 0) + 1.0).abs() < 1e-12);
        assert!(z.get(0, 1).abs() < 1e-12);
        assert!((z.get(0, 2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn builtin_name_lookup_is_case_insensitive() {
        assert!(is_builtin_name("Rank"));
        assert!(is_builtin_name("TS_MEAN"));
        assert!(is_builtin_name("pi"));
        assert!(!is_builtin_name("my_alpha"));
    }
}
