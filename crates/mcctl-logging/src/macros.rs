//! ---
//! mcctl_section: "03-persistence-logging"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Context-enriching logging macros."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Every macro accepts an optional leading `context = <LogContext>` argument.

#[doc(hidden)]
#[macro_export]
macro_rules! __mc_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            instance = ctx.instance.unwrap_or(""),
            backend = ctx.backend.unwrap_or(""),
            operation = ctx.operation.unwrap_or(""),
            actor = ctx.actor.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with instance context.
#[macro_export]
macro_rules! mc_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with instance context.
#[macro_export]
macro_rules! mc_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with instance context.
#[macro_export]
macro_rules! mc_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with instance context.
#[macro_export]
macro_rules! mc_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mc_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
