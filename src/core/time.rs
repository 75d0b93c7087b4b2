use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

pub(crate) fn seconds_between(start: PrimitiveDateTime, end: PrimitiveDateTime) -> f64 {
    (end.assume_utc() - start.assume_utc()).as_seconds_f64()
}

pub(crate) fn shift(value: PrimitiveDateTime, by: std::time::Duration) -> PrimitiveDateTime {
    value.saturating_add(Duration::try_from(by).unwrap_or(Duration::MAX))
}

pub(crate) fn shift_back(value: PrimitiveDateTime, by: std::time::Duration) -> PrimitiveDateTime {
    value.saturating_sub(Duration::try_from(by).unwrap_or(Duration::MAX))
}
