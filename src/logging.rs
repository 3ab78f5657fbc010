use tracing_subscriber::{Registry, filter::LevelFilter, fmt, layer::SubscriberExt, reload};

/// Lets the RPC plane change the log threshold of a running node.
#[derive(Clone)]
pub struct LogHandle {
    reload_handle: Option<reload::Handle<LevelFilter, Registry>>,
}

/// Installs the global subscriber, filtered at `level` (`error` .. `trace`, or `off`).
pub fn init(level: &str) -> anyhow::Result<LogHandle> {
    let level: LevelFilter = level.parse()?;
    let (level_filter, reload_handle) = reload::Layer::new(level);

    let subscriber = tracing_subscriber::registry()
        .with(level_filter)
        .with(fmt::Layer::default());
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(LogHandle {
        reload_handle: Some(reload_handle),
    })
}

impl LogHandle {
    /// A handle with no subscriber behind it. Level changes are validated and then ignored.
    pub fn detached() -> Self {
        Self {
            reload_handle: None,
        }
    }

    pub fn set_level(&self, level: &str) -> anyhow::Result<()> {
        let level: LevelFilter = level.parse()?;
        if let Some(handle) = &self.reload_handle {
            handle.modify(|filter| *filter = level)?;
        }
        tracing::info!("Log threshold set to {}", level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_validates_levels() {
        let handle = LogHandle::detached();
        assert!(handle.set_level("debug").is_ok());
        assert!(handle.set_level("WARN").is_ok());
        assert!(handle.set_level("chatty").is_err());
    }
}
