//! Fault values submitted to the pipeline.

use std::fmt;

/// Where a fault was raised when it came out of handling a chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultContext {
    pub guild: String,
    pub channel: String,
    pub user: String,
    pub avatar_url: Option<String>,
}

impl FaultContext {
    /// `<guild>><channel>><user>` attribution line.
    pub fn attribution(&self) -> String {
        format!("{}>{}>{}", self.guild, self.channel, self.user)
    }
}

/// A captured fault and its cause chain.
///
/// The pipeline never mutates a fault once it has been submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    kind: String,
    message: Option<String>,
    context: Option<FaultContext>,
    cause: Option<Box<Fault>>,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: kind.into(),
            message: if message.is_empty() {
                None
            } else {
                Some(message)
            },
            context: None,
            cause: None,
        }
    }

    /// Build a fault from any error, following its `source()` chain.
    pub fn from_error(kind: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut fault = Fault::new(kind, err.to_string());
        if let Some(src) = err.source() {
            fault.cause = Some(Box::new(Fault::from_error("Caused", src)));
        }
        fault
    }

    pub fn with_cause(mut self, cause: Fault) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_context(mut self, context: FaultContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn context(&self) -> Option<&FaultContext> {
        self.context.as_ref()
    }

    pub fn cause(&self) -> Option<&Fault> {
        self.cause.as_deref()
    }

    /// Iterate over the causes, nearest first (the fault itself excluded).
    pub fn causes(&self) -> impl Iterator<Item = &Fault> {
        std::iter::successors(self.cause(), |f| f.cause())
    }

    /// Canonical multi-line rendering, used as the report plaintext.
    pub fn render_trace(&self) -> String {
        let mut out = self.headline();
        if let Some(ctx) = &self.context {
            out.push_str("\n\tduring message handling in ");
            out.push_str(&ctx.attribution());
        }
        for cause in self.causes() {
            out.push_str("\nCaused by: ");
            out.push_str(&cause.headline());
        }
        out.push('\n');
        out
    }

    fn headline(&self) -> String {
        match &self.message {
            Some(m) => format!("{}: {m}", self.kind),
            None => self.kind.clone(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline())
    }
}
