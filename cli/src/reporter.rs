use neobuild::{BuildEvent, LogKind};

use crate::cli::Format;

/// Renders one progress event for stdout.
pub fn render(event: &BuildEvent, format: Format) -> anyhow::Result<String> {
    if format == Format::Json {
        return Ok(serde_json::to_string(event)?);
    }

    Ok(match event {
        BuildEvent::Started { id } => format!("build {id} started"),
        BuildEvent::Step { message, .. } => format!("==> {message}"),
        BuildEvent::Log { kind, message, .. } => match kind {
            LogKind::Log => format!("    {message}"),
            LogKind::Success => format!("  ✓ {message}"),
            LogKind::Error => format!("  ! {message}"),
        },
        BuildEvent::Error { message, .. } => format!("error: {message}"),
        BuildEvent::Aborted { .. } => "build aborted".to_string(),
        BuildEvent::Completed { .. } => "build completed".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use neobuild::BuildId;

    use super::*;

    #[test]
    fn test_render_text() {
        let id = BuildId::from("b1");
        let step = BuildEvent::Step {
            id: id.clone(),
            message: "Building project...".into(),
        };
        assert_eq!(render(&step, Format::Text).unwrap(), "==> Building project...");

        let log = BuildEvent::Log {
            id,
            kind: LogKind::Error,
            message: "make: *** [all] Error 2".into(),
        };
        assert_eq!(render(&log, Format::Text).unwrap(), "  ! make: *** [all] Error 2");
        assert_eq!(
            render(&BuildEvent::Aborted { id: None }, Format::Text).unwrap(),
            "build aborted"
        );
    }

    #[test]
    fn test_render_json() {
        let event = BuildEvent::Completed {
            id: BuildId::from("b1"),
        };
        let line = render(&event, Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "build-completed");
        assert_eq!(value["id"], "b1");
    }
}
