use tracing::{debug, error, info, trace, warn};

/// Component name plus fixed `key=value` pairs attached to every line
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub extra_fields: Vec<(String, String)>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            extra_fields: Vec::new(),
        }
    }

    /// Tag lines with `key=value`, e.g. the charger gid for the Emporia client
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.push((key.to_string(), value));
        self
    }
}

/// Component logger; the context is rendered once at construction
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    fields: String,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        let fields = std::iter::once(format!("component={}", context.component))
            .chain(
                context
                    .extra_fields
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value)),
            )
            .collect::<Vec<_>>()
            .join(",");
        Self { fields }
    }

    pub fn info(&self, message: &str) {
        info!(fields = %self.fields, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(fields = %self.fields, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(fields = %self.fields, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        debug!(fields = %self.fields, "{}", message);
    }

    pub fn trace(&self, message: &str) {
        trace!(fields = %self.fields, "{}", message);
    }
}

/// Logger for one component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Logger for one component with extra fields
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
