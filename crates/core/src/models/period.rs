use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 报告频率
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportingCadence {
    Monthly,
    Quarterly,
    Annual,
}

/// 报告期间：`YYYY-MM`、`YYYY-QN` 或 `YYYY`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReportingPeriod {
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    Year { year: i32 },
}

impl ReportingPeriod {
    /// 计算在给定时刻触发时应报告的期间
    ///
    /// 季度报告在季度结束后的下一季度内提交：1-3月报上年Q4，4-6月报Q1，7-9月报Q2，10-12月报Q3。
    /// 年度报告对应上一自然年，月度报告对应上一个月。
    pub fn for_cadence(cadence: ReportingCadence, at: DateTime<Utc>) -> Self {
        let year = at.year();
        let month = at.month();
        match cadence {
            ReportingCadence::Quarterly => match month {
                1..=3 => ReportingPeriod::Quarter {
                    year: year - 1,
                    quarter: 4,
                },
                4..=6 => ReportingPeriod::Quarter { year, quarter: 1 },
                7..=9 => ReportingPeriod::Quarter { year, quarter: 2 },
                _ => ReportingPeriod::Quarter { year, quarter: 3 },
            },
            ReportingCadence::Annual => ReportingPeriod::Year { year: year - 1 },
            ReportingCadence::Monthly => {
                if month == 1 {
                    ReportingPeriod::Month {
                        year: year - 1,
                        month: 12,
                    }
                } else {
                    ReportingPeriod::Month {
                        year,
                        month: month - 1,
                    }
                }
            }
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            ReportingPeriod::Month { year, .. }
            | ReportingPeriod::Quarter { year, .. }
            | ReportingPeriod::Year { year } => *year,
        }
    }

    /// 期间第一天
    pub fn start_date(&self) -> Option<NaiveDate> {
        match *self {
            ReportingPeriod::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
            ReportingPeriod::Quarter { year, quarter } => {
                NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)
            }
            ReportingPeriod::Year { year } => NaiveDate::from_ymd_opt(year, 1, 1),
        }
    }

    /// 期间最后一天
    pub fn end_date(&self) -> Option<NaiveDate> {
        let (year, last_month) = match *self {
            ReportingPeriod::Month { year, month } => (year, month),
            ReportingPeriod::Quarter { year, quarter } => (year, quarter * 3),
            ReportingPeriod::Year { year } => (year, 12),
        };
        let (next_year, next_month) = if last_month == 12 {
            (year + 1, 1)
        } else {
            (year, last_month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportingPeriod::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            ReportingPeriod::Quarter { year, quarter } => write!(f, "{year:04}-Q{quarter}"),
            ReportingPeriod::Year { year } => write!(f, "{year:04}"),
        }
    }
}

impl FromStr for ReportingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid reporting period: {s}");
        let year_part = s.get(0..4).ok_or_else(invalid)?;
        if !year_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year_part.parse().map_err(|_| invalid())?;

        match &s[4..] {
            "" => Ok(ReportingPeriod::Year { year }),
            rest => {
                let rest = rest.strip_prefix('-').ok_or_else(invalid)?;
                if let Some(q) = rest.strip_prefix('Q') {
                    match q {
                        "1" | "2" | "3" | "4" => Ok(ReportingPeriod::Quarter {
                            year,
                            quarter: q.parse().map_err(|_| invalid())?,
                        }),
                        _ => Err(invalid()),
                    }
                } else if rest.len() == 2 && rest.chars().all(|c| c.is_ascii_digit()) {
                    let month: u32 = rest.parse().map_err(|_| invalid())?;
                    if (1..=12).contains(&month) {
                        Ok(ReportingPeriod::Month { year, month })
                    } else {
                        Err(invalid())
                    }
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quarterly_period_boundaries() {
        let cases = [
            (1, "2023-Q4"),
            (3, "2023-Q4"),
            (4, "2024-Q1"),
            (6, "2024-Q1"),
            (7, "2024-Q2"),
            (9, "2024-Q2"),
            (10, "2024-Q3"),
            (12, "2024-Q3"),
        ];
        for (month, expected) in cases {
            let at = Utc.with_ymd_and_hms(2024, month, 28, 9, 0, 0).unwrap();
            let period = ReportingPeriod::for_cadence(ReportingCadence::Quarterly, at);
            assert_eq!(period.to_string(), expected, "month {month}");
        }
    }

    #[test]
    fn test_annual_and_monthly_periods() {
        let jan = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        assert_eq!(
            ReportingPeriod::for_cadence(ReportingCadence::Annual, jan).to_string(),
            "2023"
        );
        assert_eq!(
            ReportingPeriod::for_cadence(ReportingCadence::Monthly, jan).to_string(),
            "2023-12"
        );

        let may = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert_eq!(
            ReportingPeriod::for_cadence(ReportingCadence::Monthly, may).to_string(),
            "2024-04"
        );
    }

    #[test]
    fn test_parse_and_dates() {
        let q2: ReportingPeriod = "2024-Q2".parse().unwrap();
        assert_eq!(q2.start_date(), NaiveDate::from_ymd_opt(2024, 4, 1));
        assert_eq!(q2.end_date(), NaiveDate::from_ymd_opt(2024, 6, 30));

        let feb: ReportingPeriod = "2024-02".parse().unwrap();
        assert_eq!(feb.end_date(), NaiveDate::from_ymd_opt(2024, 2, 29));

        let year: ReportingPeriod = "2023".parse().unwrap();
        assert_eq!(year.end_date(), NaiveDate::from_ymd_opt(2023, 12, 31));

        assert!("2024-13".parse::<ReportingPeriod>().is_err());
        assert!("2024-Q5".parse::<ReportingPeriod>().is_err());
        assert!("24-Q1".parse::<ReportingPeriod>().is_err());
        assert!("2024-1".parse::<ReportingPeriod>().is_err());
    }
}
