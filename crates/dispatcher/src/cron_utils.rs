use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use regreport_core::{ReportingError, ReportingResult};

/// 把标准5字段CRON表达式转换为 `cron` crate 使用的带秒字段格式
///
/// 5字段表达式的星期字段按 0-7（0和7都是周日）解释，转换为 1-7（1是周日）。
/// 6或7字段的表达式原样返回。
pub fn normalize_cron_expression(cron_expr: &str) -> ReportingResult<String> {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let day_of_week = convert_day_of_week(cron_expr, fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(invalid_cron(
            cron_expr,
            format!("expected 5 fields, found {n}"),
        )),
    }
}

fn invalid_cron(cron_expr: &str, message: impl Into<String>) -> ReportingError {
    ReportingError::InvalidCron {
        expr: cron_expr.to_string(),
        message: message.into(),
    }
}

fn shift_weekday(cron_expr: &str, value: &str) -> ReportingResult<u32> {
    let day: u32 = value
        .parse()
        .map_err(|_| invalid_cron(cron_expr, format!("invalid day of week: {value}")))?;
    if day > 7 {
        return Err(invalid_cron(cron_expr, format!("day of week out of range: {day}")));
    }
    Ok(day % 7 + 1)
}

fn parse_weekday(cron_expr: &str, value: &str) -> ReportingResult<u32> {
    value
        .parse()
        .map_err(|_| invalid_cron(cron_expr, format!("invalid day of week: {value}")))
}

fn convert_day_of_week(cron_expr: &str, field: &str) -> ReportingResult<String> {
    let mut parts = Vec::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| invalid_cron(cron_expr, format!("invalid step: {step}")))?;
                (base, Some(step))
            }
            None => (item, None),
        };
        let with_step = |s: String| match step {
            Some(step) => format!("{s}/{step}"),
            None => s,
        };

        // 名称（MON-FRI）和通配符不需要转换
        if base == "*" || base == "?" || base.chars().any(|c| c.is_ascii_alphabetic()) {
            parts.push(item.to_string());
            continue;
        }

        // `N/step` 等价于 `N-7/step`
        let (start, end) = match base.split_once('-') {
            Some((start, end)) => (parse_weekday(cron_expr, start)?, parse_weekday(cron_expr, end)?),
            None if step.is_some() => (parse_weekday(cron_expr, base)?, 7),
            None => {
                let day = shift_weekday(cron_expr, base)?;
                parts.push(day.to_string());
                continue;
            }
        };
        if start > end || end > 7 {
            return Err(invalid_cron(cron_expr, format!("invalid day of week range: {base}")));
        }

        if start == 0 && end == 7 {
            parts.push(with_step("1-7".to_string()));
        } else if start == 7 {
            parts.push("1".to_string());
        } else if end == 7 {
            // 以周日结尾的区间拆成两段，周日只在步长命中时保留
            let shifted = start % 7 + 1;
            parts.push(with_step(format!("{shifted}-7")));
            let sunday_on_grid = step.map_or(true, |step| (7 - start) % step == 0);
            if sunday_on_grid && shifted != 1 {
                parts.push("1".to_string());
            }
        } else {
            parts.push(with_step(format!("{}-{}", start % 7 + 1, end % 7 + 1)));
        }
    }
    Ok(parts.join(","))
}

fn is_restricted(field: &str) -> bool {
    field != "*" && field != "?"
}

/// 日期和星期字段都受限时，标准CRON在任一字段匹配时触发。
/// `cron` crate 对两者取交集，所以拆成两个调度分别计算。
fn build_schedules(cron_expr: &str, normalized: &str) -> ReportingResult<Vec<Schedule>> {
    let fields: Vec<&str> = normalized.split_whitespace().collect();
    let variants = if fields.len() >= 6 && is_restricted(fields[3]) && is_restricted(fields[5]) {
        let mut by_day_of_month = fields.clone();
        by_day_of_month[5] = "*";
        let mut by_day_of_week = fields.clone();
        by_day_of_week[3] = "*";
        vec![by_day_of_month.join(" "), by_day_of_week.join(" ")]
    } else {
        vec![normalized.to_string()]
    };

    variants
        .iter()
        .map(|expr| Schedule::from_str(expr).map_err(|e| invalid_cron(cron_expr, e.to_string())))
        .collect()
}

/// 计算严格晚于 `after` 的下一次触发时间
pub fn next_fire_time(
    cron_expr: &str,
    after: DateTime<Utc>,
) -> ReportingResult<Option<DateTime<Utc>>> {
    Ok(CronScheduler::new(cron_expr)?.next_execution_time(after))
}

/// CRON表达式解析和调度工具
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedules: Vec<Schedule>,
}

impl CronScheduler {
    /// 创建新的CRON调度器，接受5字段或带秒的6/7字段表达式
    pub fn new(cron_expr: &str) -> ReportingResult<Self> {
        let normalized = normalize_cron_expression(cron_expr)?;
        let schedules = build_schedules(cron_expr, &normalized)?;

        Ok(Self {
            expression: cron_expr.to_string(),
            schedules,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self
            .schedules
            .iter()
            .filter_map(|schedule| schedule.after(&from).next())
            .min();
        if next.is_none() {
            debug!("CRON表达式 {} 在 {} 之后没有执行时间", self.expression, from);
        }
        next
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = from;
        while times.len() < count {
            match self.next_execution_time(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> ReportingResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }
}
