//! Query template resolution.
//!
//! Expands macro variables in a query template into a literal index
//! query. The substitutor captures one `now` instant at construction;
//! that instant is substituted for `__NOW__` and must be reused verbatim
//! as the new watermark if the cycle succeeds.
//!
//! Macro forms, `${…}`-wrapped (the timestamp macros also work bare):
//! - `__NOW__`, `__TIME_OF_LAST_HARVEST__` (epoch when unset)
//! - `${__WEEKCODE_<CODE>__}` and `_MINUS_n`/`_PLUS_n` suffixes —
//!   resolved by the week-resolver service for `now ± n` weeks
//! - `${__NEXTWEEK_<CODE>__}` — `<CODE>` + ISO week code of next week,
//!   computed locally without the resolver
//! - `${__WEEK_PLUS_n__}` / `${__WEEK_MINUS_n__}` — bare ISO week code
//!
//! Unknown macros are left untouched.

use chrono::{DateTime, Datelike, Duration, Utc};

use bibharvest_connector::WeekResolver;
use bibharvest_core::HarvesterError;

pub struct QuerySubstitutor {
    now: DateTime<Utc>,
}

impl QuerySubstitutor {
    /// Substitutor capturing the current instant.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Substitutor pinned to a specific instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// The capture instant used for `__NOW__`.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Expand all macros in `template` into a literal query string.
    pub async fn replace(
        &self,
        template: &str,
        time_of_last_harvest: Option<DateTime<Utc>>,
        week_resolver: &dyn WeekResolver,
    ) -> Result<String, HarvesterError> {
        let now_str = format_utc(self.now);
        let last_str = format_utc(time_of_last_harvest.unwrap_or(DateTime::UNIX_EPOCH));

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${__") {
            let Some(end_rel) = rest[start..].find("__}") else {
                break; // unterminated macro, copied through verbatim below
            };
            let end = start + end_rel + "__}".len();
            out.push_str(&rest[..start]);
            let token = &rest[start + "${__".len()..end - "__}".len()];
            match self
                .expand(token, &now_str, &last_str, week_resolver)
                .await?
            {
                Some(value) => out.push_str(&value),
                None => out.push_str(&rest[start..end]),
            }
            rest = &rest[end..];
        }
        out.push_str(rest);

        // Bare timestamp forms (wrapped occurrences are already gone).
        Ok(out
            .replace("__NOW__", &now_str)
            .replace("__TIME_OF_LAST_HARVEST__", &last_str))
    }

    async fn expand(
        &self,
        token: &str,
        now_str: &str,
        last_str: &str,
        week_resolver: &dyn WeekResolver,
    ) -> Result<Option<String>, HarvesterError> {
        if token == "NOW" {
            return Ok(Some(now_str.to_string()));
        }
        if token == "TIME_OF_LAST_HARVEST" {
            return Ok(Some(last_str.to_string()));
        }
        if let Some(code) = token.strip_prefix("NEXTWEEK_") {
            let week = iso_week_code(self.now + Duration::weeks(1));
            return Ok(Some(format!("{code}{week}")));
        }
        if let Some(n) = token.strip_prefix("WEEK_PLUS_") {
            return Ok(n
                .parse::<i64>()
                .ok()
                .map(|n| iso_week_code(self.now + Duration::weeks(n))));
        }
        if let Some(n) = token.strip_prefix("WEEK_MINUS_") {
            return Ok(n
                .parse::<i64>()
                .ok()
                .map(|n| iso_week_code(self.now - Duration::weeks(n))));
        }
        if let Some(rest) = token.strip_prefix("WEEKCODE_") {
            let (code, shift_weeks) = parse_weekcode_shift(rest);
            let date = (self.now + Duration::weeks(shift_weeks)).date_naive();
            let week_code = week_resolver
                .week_code(code, date)
                .await
                .map_err(|e| HarvesterError::QueryResolution(e.to_string()))?;
            return Ok(Some(week_code));
        }
        Ok(None)
    }
}

impl Default for QuerySubstitutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `"BKM_MINUS_3"` into `("BKM", -3)`; no suffix means shift 0.
fn parse_weekcode_shift(rest: &str) -> (&str, i64) {
    if let Some(idx) = rest.rfind("_MINUS_") {
        if let Ok(n) = rest[idx + "_MINUS_".len()..].parse::<i64>() {
            return (&rest[..idx], -n);
        }
    }
    if let Some(idx) = rest.rfind("_PLUS_") {
        if let Ok(n) = rest[idx + "_PLUS_".len()..].parse::<i64>() {
            return (&rest[..idx], n);
        }
    }
    (rest, 0)
}

fn format_utc(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn iso_week_code(instant: DateTime<Utc>) -> String {
    let iso = instant.iso_week();
    format!("{:04}{:02}", iso.year(), iso.week())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use bibharvest_connector::ConnectorError;

    use super::*;

    /// Derives week codes from the date itself and records every call.
    struct StubWeekResolver {
        calls: Mutex<Vec<(String, NaiveDate)>>,
        fail: bool,
    }

    impl StubWeekResolver {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl WeekResolver for StubWeekResolver {
        async fn week_code(
            &self,
            catalogue_code: &str,
            date: NaiveDate,
        ) -> Result<String, ConnectorError> {
            if self.fail {
                return Err(ConnectorError::UnexpectedStatus {
                    status: 500,
                    message: "week resolver down".to_string(),
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push((catalogue_code.to_string(), date));
            let iso = date.iso_week();
            Ok(format!(
                "{catalogue_code}{:04}{:02}",
                iso.year(),
                iso.week()
            ))
        }
    }

    fn substitutor() -> QuerySubstitutor {
        // Friday of ISO week 24, 2023
        QuerySubstitutor::at("2023-06-16T12:00:00Z".parse().unwrap())
    }

    #[tokio::test]
    async fn test_now_and_watermark_substitution() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let last = "2023-06-01T00:00:00Z".parse().unwrap();
        let query = sub
            .replace(
                "datefield:[__TIME_OF_LAST_HARVEST__ TO __NOW__]",
                Some(last),
                &resolver,
            )
            .await
            .unwrap();
        assert_eq!(
            query,
            "datefield:[2023-06-01T00:00:00Z TO 2023-06-16T12:00:00Z]"
        );
    }

    #[tokio::test]
    async fn test_unset_watermark_substitutes_epoch() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace("datefield:[${__TIME_OF_LAST_HARVEST__} TO ${__NOW__}]", None, &resolver)
            .await
            .unwrap();
        assert_eq!(
            query,
            "datefield:[1970-01-01T00:00:00Z TO 2023-06-16T12:00:00Z]"
        );
    }

    #[tokio::test]
    async fn test_nextweek_pattern_is_computed_locally() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace(
                "term.kk:${__NEXTWEEK_BKM__} OR term.kk:${__NEXTWEEK_ACC__}",
                None,
                &resolver,
            )
            .await
            .unwrap();
        assert_eq!(query, "term.kk:BKM202325 OR term.kk:ACC202325");
        assert!(resolver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_week_plus_minus_pattern() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace(
                "term.kk:${__WEEK_PLUS_3__} OR term.kk:${__WEEK_PLUS_0__} \
                 OR term.kk:${__WEEK_MINUS_0__} OR term.kk:${__WEEK_MINUS_3__}",
                None,
                &resolver,
            )
            .await
            .unwrap();
        assert_eq!(
            query,
            "term.kk:202327 OR term.kk:202324 OR term.kk:202324 OR term.kk:202321"
        );
    }

    #[tokio::test]
    async fn test_weekcode_pattern_delegates_to_resolver() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace("term.kk:${__WEEKCODE_BKM__}", None, &resolver)
            .await
            .unwrap();
        assert_eq!(query, "term.kk:BKM202324");
        let calls = resolver.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            ("BKM".to_string(), NaiveDate::from_ymd_opt(2023, 6, 16).unwrap())
        );
    }

    #[tokio::test]
    async fn test_weekcode_minus_shifts_resolver_date() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace("term.kk:${__WEEKCODE_DBF_MINUS_3__}", None, &resolver)
            .await
            .unwrap();
        assert_eq!(query, "term.kk:DBF202321");
        let calls = resolver.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            ("DBF".to_string(), NaiveDate::from_ymd_opt(2023, 5, 26).unwrap())
        );
    }

    #[tokio::test]
    async fn test_weekcode_plus_shifts_resolver_date() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace("term.kk:${__WEEKCODE_ACC_PLUS_3__}", None, &resolver)
            .await
            .unwrap();
        assert_eq!(query, "term.kk:ACC202327");
    }

    #[tokio::test]
    async fn test_resolver_failure_is_a_resolution_error() {
        let sub = substitutor();
        let resolver = StubWeekResolver::failing();
        let err = sub
            .replace("term.kk:${__WEEKCODE_BKM__}", None, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvesterError::QueryResolution(_)));
    }

    #[tokio::test]
    async fn test_unknown_macro_is_left_untouched() {
        let sub = substitutor();
        let resolver = StubWeekResolver::new();
        let query = sub
            .replace("term.kk:${__MYSTERY__} AND __NOW__", None, &resolver)
            .await
            .unwrap();
        assert_eq!(query, "term.kk:${__MYSTERY__} AND 2023-06-16T12:00:00Z");
    }
}
