//! Failure information carried on messages
//!
//! A flattened exception chain. Frame 0 is the outermost failure; every
//! other frame points at the frame it was caused by or aggregated under.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Kind used for panics caught while running a test body
pub const PANIC_KIND: &str = "panic";

/// Kind used for the outer frame of an aggregate failure
pub const AGGREGATE_KIND: &str = "AggregateFailure";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureFrame {
    pub kind: String,
    pub message: String,
    pub parent: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub frames: Vec<FailureFrame>,
}

impl FailureInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            frames: vec![FailureFrame {
                kind: kind.into(),
                message: message.into(),
                parent: None,
            }],
        }
    }

    /// Flatten an `anyhow` chain, outermost context first
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let mut frames = Vec::new();
        for (index, cause) in error.chain().enumerate() {
            frames.push(FailureFrame {
                kind: "error".to_string(),
                message: cause.to_string(),
                parent: index.checked_sub(1),
            });
        }
        Self { frames }
    }

    /// Flatten a typed error and its `source()` chain
    pub fn from_error(kind: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut info = Self::new(kind, error.to_string());
        let mut source = error.source();
        while let Some(cause) = source {
            let parent = info.frames.len() - 1;
            info.frames.push(FailureFrame {
                kind: "error".to_string(),
                message: cause.to_string(),
                parent: Some(parent),
            });
            source = cause.source();
        }
        info
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test body panicked".to_string()
        };
        Self::new(PANIC_KIND, message)
    }

    /// Combine several failures under one aggregate frame
    pub fn aggregate(failures: &[FailureInfo]) -> Self {
        if failures.len() == 1 {
            return failures[0].clone();
        }

        let mut info = Self::new(
            AGGREGATE_KIND,
            format!("{} failures occurred", failures.len()),
        );
        for failure in failures {
            let offset = info.frames.len();
            for frame in &failure.frames {
                info.frames.push(FailureFrame {
                    kind: frame.kind.clone(),
                    message: frame.message.clone(),
                    parent: Some(frame.parent.map(|p| p + offset).unwrap_or(0)),
                });
            }
        }
        info
    }

    pub fn kind(&self) -> &str {
        self.frames.first().map(|f| f.kind.as_str()).unwrap_or("")
    }

    pub fn message(&self) -> &str {
        self.frames.first().map(|f| f.message.as_str()).unwrap_or("")
    }

    /// Whether any frame mentions `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.frames.iter().any(|f| f.message.contains(needle))
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                write!(f, "\n---- ")?;
            }
            write!(f, "{} : {}", frame.kind, frame.message)?;
        }
        Ok(())
    }
}
