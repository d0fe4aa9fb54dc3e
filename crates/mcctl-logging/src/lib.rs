//! ---
//! mcctl_section: "03-persistence-logging"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Structured logging context and lifecycle event helpers."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![warn(missing_docs)]

use tracing::{Level, Span};
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Install a stderr subscriber for commands that run before configuration loads.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Fields attached to every lifecycle event: which instance, on which backend, doing what,
/// for whom. Empty fields are written as `""` so log queries can rely on their presence.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Instance name the event concerns.
    pub instance: Option<&'a str>,
    /// Backend kind driving the instance (`shell-managed`, `supervisor-managed`).
    pub backend: Option<&'a str>,
    /// Orchestration operation in progress.
    pub operation: Option<&'a str>,
    /// Principal that requested the operation.
    pub actor: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a backend acting on one instance.
    pub fn lifecycle(instance: &'a str, backend: &'a str) -> Self {
        Self {
            instance: Some(instance),
            backend: Some(backend),
            ..Self::default()
        }
    }

    /// Attach an instance name.
    pub fn with_instance(mut self, instance: &'a str) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Attach a backend kind.
    pub fn with_backend(mut self, backend: &'a str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach an operation name.
    pub fn with_operation(mut self, operation: &'a str) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attach the requesting actor.
    pub fn with_actor(mut self, actor: &'a str) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Span carrying the context, for work whose nested events should inherit it.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "lifecycle",
            instance = self.instance.unwrap_or(""),
            backend = self.backend.unwrap_or(""),
            operation = self.operation.unwrap_or(""),
        )
    }
}

/// Outcome recorded in the `outcome` field of a system event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    /// Lowercase label written into the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit one system event per finished operation. Faults log at ERROR, successes at INFO.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    let outcome = outcome.as_str();
    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                $level,
                event,
                outcome,
                instance = ctx.instance.unwrap_or(""),
                backend = ctx.backend.unwrap_or(""),
                operation = ctx.operation.unwrap_or(""),
                actor = ctx.actor.unwrap_or(""),
                "{message}"
            )
        };
    }
    if outcome == "fault" {
        emit!(Level::ERROR)
    } else {
        emit!(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(body: impl FnOnce()) -> String {
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(out.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, body);
        out.text()
    }

    #[test]
    fn lifecycle_macros_carry_instance_and_backend() {
        let text = capture(|| {
            let ctx = LogContext::lifecycle("survival-1", "shell-managed").with_operation("stop");
            mc_info!(context = ctx.clone(), "instance stopped");
            mc_error!(context = ctx, "compose exited with {}", 1);
            mc_debug!("no context");
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3, "{text}");
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains(r#"instance="survival-1""#), "{}", lines[0]);
        assert!(lines[0].contains(r#"backend="shell-managed""#));
        assert!(lines[0].contains(r#"operation="stop""#));
        assert!(lines[1].contains("ERROR") && lines[1].contains("compose exited with 1"));
        assert!(lines[2].contains(r#"backend="""#));
    }

    #[test]
    fn faults_log_at_error_and_successes_at_info() {
        let text = capture(|| {
            let ctx = LogContext::new()
                .with_instance("survival-1")
                .with_actor("cli:local");
            log_system_event(Some(&ctx), "server.stop", "done", SystemEventOutcome::Success);
            log_system_event(None, "server.stop", "unreachable", SystemEventOutcome::Fault);
        });
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("INFO") && lines[0].contains(r#"outcome="success""#));
        assert!(lines[0].contains(r#"actor="cli:local""#));
        assert!(lines[1].contains("ERROR") && lines[1].contains(r#"outcome="fault""#));
    }

    #[test]
    fn span_fields_prefix_nested_events() {
        let text = capture(|| {
            let ctx = LogContext::lifecycle("lobby", "supervisor-managed");
            let _guard = ctx.span().entered();
            tracing::info!("inside");
        });
        assert!(text.contains("lifecycle{"), "{text}");
        assert!(text.contains("lobby"));
    }
}
