//! Tracing subscriber setup for the command line
//!
//! The library only emits events and spans; the binary installs the subscriber
//! configured here.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored, human-readable output (default)
    #[default]
    Console,
    /// Plain compact output for CI logs
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "compact" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Overrides `verbosity` when set
    pub env_filter: Option<String>,
    /// Logged once at startup for correlation
    pub session_id: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the verbosity level
    ///
    /// Dependency crates stay at `warn` until `-vv`.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,bannerkit=info,tower_http=info",
            1 => "warn,bannerkit=debug,tower_http=debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(directive) => EnvFilter::try_new(directive)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(layer).try_init()?;
            },
            TracingFormat::Compact => {
                let layer = fmt::layer().with_ansi(false).with_target(false).compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "session started");
        }
        Ok(())
    }
}

/// Install the CLI subscriber; `RUST_LOG` wins over `-v` when set
///
/// # Errors
/// - See [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string());
    if let Ok(directive) = std::env::var("RUST_LOG") {
        if !directive.trim().is_empty() {
            config = config.with_env_filter(directive);
        }
    }
    config.init()
}

/// Spans wrapping whole CLI operations
pub mod spans {
    use tracing::{Level, Span};

    pub fn command(name: &str) -> Span {
        tracing::span!(Level::INFO, "command", name = %name)
    }

    pub fn resolve(url: &str, bucket: &str) -> Span {
        tracing::span!(Level::INFO, "resolve", url = %url, bucket = %bucket)
    }

    pub fn removal(input: &std::path::Path) -> Span {
        tracing::span!(Level::INFO, "removal", input = %input.display())
    }

    pub fn model_download(precision: &str) -> Span {
        tracing::span!(Level::INFO, "model_download", precision = %precision)
    }
}
