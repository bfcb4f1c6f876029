//! Stdout event printer for demos and debugging.
//!
//! ```text
//! [listener-added] listener=1 selector="type"
//! [task-started] listener=1 task=4 action="counter/increment"
//! [task-cancelled] listener=1 task=4 reason="listener-cancelled"
//! [effect-failed] listener=2 task=5 raised_by=effect err="effect failed: boom"
//! [listeners-cleared]
//! ```

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Prints one line per event.
#[derive(Default, Debug)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render(e: &Event) -> String {
        let mut line = format!("[{}]", e.kind.as_str());
        if let Some(listener) = e.listener {
            let _ = write!(line, " listener={listener}");
        }
        if let Some(task) = e.task {
            let _ = write!(line, " task={task}");
        }
        if let Some(raised_by) = e.raised_by {
            let _ = write!(line, " raised_by={raised_by}");
        }
        if let Some(reason) = e.reason.as_deref() {
            let key = match e.kind {
                EventKind::ListenerAdded => "selector",
                EventKind::TaskStarted => "action",
                EventKind::ForkCompleted => "status",
                EventKind::TaskFailed | EventKind::EffectFailed | EventKind::PredicateFailed => "err",
                _ => "reason",
            };
            let _ = write!(line, " {key}={reason:?}");
        }
        line
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        println!("{}", Self::render(e));
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RaisedBy;

    #[test]
    fn renders_only_present_fields() {
        let ev = Event::new(EventKind::EffectFailed)
            .with_listener(2)
            .with_task(5)
            .with_reason("effect failed: boom")
            .with_raised_by(RaisedBy::Effect);
        assert_eq!(
            LogWriter::render(&ev),
            r#"[effect-failed] listener=2 task=5 raised_by=effect err="effect failed: boom""#
        );
        assert_eq!(
            LogWriter::render(&Event::new(EventKind::ListenersCleared)),
            "[listeners-cleared]"
        );
    }
}
