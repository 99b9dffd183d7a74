use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Crates whose events are emitted when `LOG_LEVEL` is a bare level
const CRATES: [&str; 4] = ["repute", "repute_common", "repute_dispatch", "repute_store"];

/// Turn a `LOG_LEVEL` value into filter directives
///
/// A bare level such as `debug` applies to the repute crates only. Anything
/// else is taken as a full directive list, so `repute_dispatch=trace,info`
/// works as it would in `RUST_LOG`.
fn directives(level: Option<&str>, default: LevelFilter) -> String {
    let level = match level.map(str::trim) {
        None | Some("") => default,
        Some(value) => match LevelFilter::from_str(value) {
            Ok(level) => level,
            Err(_) => return value.to_string(),
        },
    };

    CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
///
/// Calling this more than once is harmless: the second installation attempt
/// is ignored.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let requested = std::env::var("LOG_LEVEL").ok();
    let filter =
        EnvFilter::try_new(directives(requested.as_deref(), default)).unwrap_or_else(|e| {
            eprintln!("Invalid LOG_LEVEL {requested:?} ({e}), defaulting to {default}");
            EnvFilter::new(directives(None, default))
        });

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .with_target(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(filter),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bare_level_covers_every_crate() {
        assert_eq!(
            directives(Some("debug"), LevelFilter::INFO),
            "repute=debug,repute_common=debug,repute_dispatch=debug,repute_store=debug"
        );
    }

    #[test]
    fn unset_level_uses_the_default() {
        assert_eq!(directives(None, LevelFilter::WARN), directives(Some(" "), LevelFilter::WARN));
        assert!(directives(None, LevelFilter::WARN).starts_with("repute=warn,"));
    }

    #[test]
    fn directive_lists_pass_through() {
        let value = "repute_dispatch=trace,info";

        assert_eq!(directives(Some(value), LevelFilter::INFO), value);
        assert!(EnvFilter::try_new(directives(Some(value), LevelFilter::INFO)).is_ok());
    }
}
