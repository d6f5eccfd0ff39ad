//! Quarterly → daily alignment.
//!
//! A quarterly observation becomes visible on the daily timeline at its
//! announcement date, not its report date. For every trading date the
//! expanded series carries the observation with the greatest announcement
//! date not after that trading date; dates before a symbol's first
//! announcement stay NaN.

use crate::error::{PanelError, Result};
use crate::frame::{date_from_key_f64, date_key, FieldFrame};
use chrono::NaiveDate;

/// One announced observation for a symbol.
#[derive(Debug, Clone, Copy)]
struct Announcement {
    ann: i64,
    report: NaiveDate,
    value: f64,
}

/// Expand a quarterly frame onto `calendar` by announcement-driven
/// forward fill.
///
/// `values` and `ann_dates` must share the quarterly (report date) axis
/// and symbol axis; `ann_dates` holds `YYYYMMDD` keys (NaN = report row
/// absent for that symbol). When several reports share an announcement
/// date the latest report wins; the `(ann, report)` sort below makes that
/// a deterministic total order independent of storage order.
pub fn expand_quarterly(
    values: &FieldFrame,
    ann_dates: &FieldFrame,
    calendar: &[NaiveDate],
) -> Result<FieldFrame> {
    if values.dates() != ann_dates.dates() || values.symbols() != ann_dates.symbols() {
        return Err(PanelError::Shape(
            "quarterly values and announcement dates must share axes".into(),
        ));
    }

    let symbols = values.symbols().to_vec();
    let mut out = FieldFrame::filled(calendar.to_vec(), symbols, f64::NAN);

    for si in 0..values.n_symbols() {
        let mut events: Vec<Announcement> = Vec::new();
        for di in 0..values.n_dates() {
            if let Some(ann_date) = date_from_key_f64(ann_dates.get(di, si)) {
                events.push(Announcement {
                    ann: date_key(ann_date),
                    report: values.dates()[di],
                    value: values.get(di, si),
                });
            }
        }
        events.sort_by(|a, b| (a.ann, a.report).cmp(&(b.ann, b.report)));
        // collapse same-day announcements: the last (latest report) survives
        events.dedup_by(|next, prev| {
            if next.ann == prev.ann {
                *prev = *next;
                true
            } else {
                false
            }
        });

        let mut next_event = 0;
        let mut current = f64::NAN;
        for (ci, date) in calendar.iter().enumerate() {
            let key = date_key(*date);
            while next_event < events.len() && events[next_event].ann <= key {
                current = events[next_event].value;
                next_event += 1;
            }
            out.set(ci, si, current);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn weekday_calendar(start: &str, end: &str) -> Vec<NaiveDate> {
        let (mut cur, end) = (d(start), d(end));
        let mut out = Vec::new();
        while cur <= end {
            if cur.weekday().number_from_monday() <= 5 {
                out.push(cur);
            }
            cur = cur.succ_opt().unwrap();
        }
        out
    }

    fn quarterly(
        reports: &[&str],
        symbols: &[&str],
        values: &[f64],
        anns: &[f64],
    ) -> (FieldFrame, FieldFrame) {
        let dates: Vec<NaiveDate> = reports.iter().map(|s| d(s)).collect();
        let syms: Vec<String> = symbols.iter().map(|s| (*s).to_string()).collect();
        (
            FieldFrame::from_values(dates.clone(), syms.clone(), values.to_vec()),
            FieldFrame::from_values(dates, syms, anns.to_vec()),
        )
    }

    #[test]
    fn forward_fill_keyed_by_announcement() {
        // Q1 announced 2020-02-10 with value 10, Q2 announced 2020-05-12
        // with value 20; expansion over Feb..Jun.
        let (values, anns) = quarterly(
            &["2020-03-31", "2020-06-30"],
            &["A"],
            &[10.0, 20.0],
            &[20200210.0, 20200512.0],
        );
        let calendar = weekday_calendar("2020-02-01", "2020-06-01");
        let out = expand_quarterly(&values, &anns, &calendar).unwrap();

        for (ci, date) in calendar.iter().enumerate() {
            let v = out.get(ci, 0);
            if *date < d("2020-02-10") {
                assert!(v.is_nan(), "{date} should be missing");
            } else if *date < d("2020-05-12") {
                assert_eq!(v, 10.0, "{date} should carry Q1");
            } else {
                assert_eq!(v, 20.0, "{date} should carry Q2");
            }
        }
        assert_eq!(out.dates(), calendar.as_slice());
    }

    #[test]
    fn same_announcement_latest_report_wins() {
        // Both quarters announced on the same day; the later report's
        // value must be the one visible from that day on.
        let (values, anns) = quarterly(
            &["2020-03-31", "2020-06-30"],
            &["A"],
            &[10.0, 20.0],
            &[20200810.0, 20200810.0],
        );
        let calendar = weekday_calendar("2020-08-01", "2020-08-20");
        let out = expand_quarterly(&values, &anns, &calendar).unwrap();

        let idx = calendar.iter().position(|x| *x >= d("2020-08-10")).unwrap();
        assert!(out.get(idx - 1, 0).is_nan());
        assert_eq!(out.get(idx, 0), 20.0);
    }

    #[test]
    fn missing_announcement_rows_are_skipped() {
        // Symbol B never announces; symbol A has one NaN announcement row.
        let (values, anns) = quarterly(
            &["2020-03-31", "2020-06-30"],
            &["A", "B"],
            &[10.0, f64::NAN, 20.0, f64::NAN],
            &[20200410.0, f64::NAN, 20200710.0, f64::NAN],
        );
        let calendar = weekday_calendar("2020-04-01", "2020-07-31");
        let out = expand_quarterly(&values, &anns, &calendar).unwrap();

        let last = calendar.len() - 1;
        assert_eq!(out.get(last, 0), 20.0);
        assert!(out.get(last, 1).is_nan());
    }

    #[test]
    fn announced_nan_value_overwrites() {
        // A later announcement with a missing value masks the older value.
        let (values, anns) = quarterly(
            &["2020-03-31", "2020-06-30"],
            &["A"],
            &[10.0, f64::NAN],
            &[20200410.0, 20200710.0],
        );
        let calendar = weekday_calendar("2020-04-01", "2020-07-31");
        let out = expand_quarterly(&values, &anns, &calendar).unwrap();

        let before = calendar.iter().position(|x| *x >= d("2020-07-10")).unwrap() - 1;
        let last = calendar.len() - 1;
        assert_eq!(out.get(before, 0), 10.0);
        assert!(out.get(last, 0).is_nan());
    }

    #[test]
    fn axis_mismatch_is_rejected() {
        let (values, _) = quarterly(&["2020-03-31"], &["A"], &[1.0], &[20200410.0]);
        let (_, anns) = quarterly(&["2020-06-30"], &["A"], &[1.0], &[20200410.0]);
        let calendar = weekday_calendar("2020-04-01", "2020-04-10");
        assert!(matches!(
            expand_quarterly(&values, &anns, &calendar),
            Err(PanelError::Shape(_))
        ));
    }
}
