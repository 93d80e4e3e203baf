use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use colorful::Colorful;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::error::{FixtureError, FixtureResult};

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: tracing::Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    /// Also write hourly rotated log files here.
    pub log_dir: Option<PathBuf>,
    pub _tracing_guard: Option<Arc<tracing::subscriber::DefaultGuard>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            logging_enabled: true,
            logger_name: "es_fixture".to_string(),
            log_dir: None,
            _tracing_guard: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn logger_name<S: Into<String>>(mut self, logger_name: S) -> Self {
        self.logger_name = logger_name.into();
        self
    }

    pub fn log_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Install the subscriber for the current thread, for as long as this
    /// config (or a clone of it) is alive.
    pub fn load_logger(&mut self) -> FixtureResult<()> {
        self._tracing_guard = if self.logging_enabled {
            let subscriber = self.build_subscriber()?;
            Some(Arc::new(tracing::subscriber::set_default(subscriber)))
        } else {
            None
        };
        self.banner();
        Ok(())
    }

    /// Install the subscriber process-wide. Fails if one is already set.
    pub fn init_global(&self) -> FixtureResult<()> {
        if !self.logging_enabled {
            return Ok(());
        }
        let subscriber = self.build_subscriber()?;
        tracing::subscriber::set_global_default(subscriber).map_err(|e| {
            FixtureError::InvalidConfig {
                field: "logging",
                reason: e.to_string(),
            }
        })?;
        self.banner();
        Ok(())
    }

    fn banner(&self) {
        if self.logging_enabled {
            println!(
                "{}",
                format!("Starting {} Logger", self.logger_name)
                    .color(colorful::RGB::new(0, 139, 248))
                    .bold()
            );
        }
    }

    fn build_subscriber(&self) -> FixtureResult<impl tracing::Subscriber + Send + Sync> {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default());

        let file_layer = match &self.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .map_err(|e| FixtureError::file_system("create log directory", dir, e))?;
                let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(6)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(dir)
                    .map_err(|e| {
                        FixtureError::file_system(
                            "create log file appender",
                            dir,
                            std::io::Error::other(e),
                        )
                    })?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(false)
                        .with_writer(file_appender)
                        .boxed(),
                )
            }
            None => None,
        };

        let terminal_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stdout);

        Ok(tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(terminal_layer))
    }
}
