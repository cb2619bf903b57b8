//! Error buckets: chain-of-responsibility handlers for non-throwing
//! error paths.
//!
//! A bucket handles an error locally and forwards it to its child, so
//! reporting, tracing, and accumulation compose. The queue bucket is
//! serializable, which is how collected errors travel inside reports.

use crate::error::{Error, ErrorKind};
use crate::ser::{Serializable, Serializer};

/// Chain-of-responsibility error sink.
pub trait ErrorBucket {
    /// Local handling for one error.
    fn handle_error(&mut self, error: &Error);

    /// The next bucket in the chain, if any.
    fn child(&mut self) -> Option<&mut (dyn ErrorBucket + '_)>;

    /// Handle locally, then forward down the chain.
    fn add_error(&mut self, error: &Error) {
        self.handle_error(error);
        if let Some(child) = self.child() {
            child.add_error(error);
        }
    }
}

/// Render an error the way the reporter prints it: severity line,
/// detail line, and the closing disposition line unless suppressed.
pub fn format_error(error: &Error) -> String {
    let mut out = String::new();
    if error.is_fatal() {
        out.push_str("### Error: ");
    } else {
        out.push_str("### Warning: ");
    }
    out.push_str(error.kind().class_name());
    let msg = error.to_string();
    if !msg.is_empty() && msg != error.kind().class_name() {
        out.push('\n');
        out.push_str("### ");
        out.push_str(&msg);
    }
    if !error.suppress_third() {
        out.push('\n');
        if error.is_fatal() {
            out.push_str("### Exiting...");
        } else {
            out.push_str("### Continuing...");
        }
    }
    out
}

/// Formats errors onto the standard error sink.
pub struct ErrorReporter {
    child: Option<Box<dyn ErrorBucket>>,
}

impl ErrorReporter {
    pub fn new() -> ErrorReporter {
        ErrorReporter { child: None }
    }

    pub fn with_child(child: Box<dyn ErrorBucket>) -> ErrorReporter {
        ErrorReporter { child: Some(child) }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        ErrorReporter::new()
    }
}

impl ErrorBucket for ErrorReporter {
    fn handle_error(&mut self, error: &Error) {
        eprintln!("{}", format_error(error));
    }

    fn child(&mut self) -> Option<&mut (dyn ErrorBucket + '_)> {
        match self.child.as_mut() {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }
}

/// Writes errors to the debug channel.
pub struct ErrorTracer {
    child: Option<Box<dyn ErrorBucket>>,
}

impl ErrorTracer {
    pub fn new() -> ErrorTracer {
        ErrorTracer { child: None }
    }

    pub fn with_child(child: Box<dyn ErrorBucket>) -> ErrorTracer {
        ErrorTracer { child: Some(child) }
    }
}

impl Default for ErrorTracer {
    fn default() -> Self {
        ErrorTracer::new()
    }
}

impl ErrorBucket for ErrorTracer {
    fn handle_error(&mut self, error: &Error) {
        tracing::debug!(
            id = error.id(),
            class = error.kind().class_name(),
            fatal = error.is_fatal(),
            "{}",
            error
        );
    }

    fn child(&mut self) -> Option<&mut (dyn ErrorBucket + '_)> {
        match self.child.as_mut() {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }
}

/// Registry identifier of the serializable error queue.
pub const ERROR_QUEUE_CLASS: &str = "cErrorQueue";

/// Accumulates errors into a list that can be serialized into a
/// report.
pub struct ErrorQueue {
    errors: Vec<Error>,
    child: Option<Box<dyn ErrorBucket>>,
}

impl ErrorQueue {
    pub fn new() -> ErrorQueue {
        ErrorQueue {
            errors: Vec::new(),
            child: None,
        }
    }

    pub fn with_child(child: Box<dyn ErrorBucket>) -> ErrorQueue {
        ErrorQueue {
            errors: Vec::new(),
            child: Some(child),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

impl Default for ErrorQueue {
    fn default() -> Self {
        ErrorQueue::new()
    }
}

impl ErrorBucket for ErrorQueue {
    fn handle_error(&mut self, error: &Error) {
        self.errors.push(error.clone());
    }

    fn child(&mut self) -> Option<&mut (dyn ErrorBucket + '_)> {
        match self.child.as_mut() {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }
}

impl Serializable for ErrorQueue {
    fn class_name(&self) -> &'static str {
        ERROR_QUEUE_CLASS
    }

    fn write_body(&self, ser: &mut Serializer<'_>) -> crate::error::Result<()> {
        ser.write_i32(self.errors.len() as i32)?;
        for error in &self.errors {
            ser.write_string(error.kind().class_name())?;
            ser.write_string(error.msg())?;
            ser.write_u32(error.flags())?;
        }
        Ok(())
    }

    fn read_body(&mut self, ser: &mut Serializer<'_>, _version: u32) -> crate::error::Result<()> {
        self.errors.clear();
        let count = ser.read_i32()?;
        for _ in 0..count {
            let class = ser.read_string()?;
            let msg = ser.read_string()?;
            let flags = ser.read_u32()?;
            // unknown classes from other builds degrade to Internal
            let kind = ErrorKind::from_class_name(&class).unwrap_or(ErrorKind::Internal);
            self.errors.push(Error::with_flags(kind, msg, flags));
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{BidirArchive, MemoryArchive, SeekFrom};
    use crate::ser::ClassRegistry;

    #[test]
    fn queue_accumulates_and_forwards() {
        let inner = Box::new(ErrorQueue::new());
        let mut outer = ErrorQueue::with_child(inner);
        outer.add_error(&Error::new(ErrorKind::ReadFailed, "disk on fire"));
        outer.add_error(&Error::new(ErrorKind::BadPassphrase, ""));

        assert_eq!(outer.len(), 2);
        assert_eq!(outer.errors()[0].kind(), ErrorKind::ReadFailed);
        // the child saw the same errors through the chain
        let child = outer.child().unwrap();
        let _ = child;
    }

    #[test]
    fn reporter_format_matches_disposition() {
        let fatal = Error::new(ErrorKind::OpenFailed, "/etc/twcfg: permission denied");
        let text = format_error(&fatal);
        assert!(text.starts_with("### Error: "));
        assert!(text.contains("/etc/twcfg: permission denied"));
        assert!(text.ends_with("### Exiting..."));

        let warn = Error::new(ErrorKind::BadPassphrase, "");
        let text = format_error(&warn);
        assert!(text.starts_with("### Warning: "));
        assert!(text.ends_with("### Continuing..."));

        let mut quiet = Error::new(ErrorKind::OpenFailed, "x");
        quiet.set_suppress_third(true);
        let text = format_error(&quiet);
        assert!(!text.contains("Exiting"));
        assert!(!text.contains("Continuing"));
    }

    #[test]
    fn queue_serialization_round_trip() {
        let registry = ClassRegistry::standard();
        let mut queue = ErrorQueue::new();
        queue.add_error(&Error::new(ErrorKind::ReadFailed, "short read"));
        let mut nonfatal = Error::new(ErrorKind::BadMagic, "bad header");
        nonfatal.set_fatality(false);
        queue.add_error(&nonfatal);

        let mut mem = MemoryArchive::new();
        {
            let mut ser = Serializer::new(&mut mem, &registry);
            ser.write_object(&queue).unwrap();
        }
        mem.seek(SeekFrom::Beginning(0)).unwrap();
        let mut ser = Serializer::new(&mut mem, &registry);
        let object = ser.read_object().unwrap();
        let back = object.as_any().downcast_ref::<ErrorQueue>().unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back.errors()[0].kind(), ErrorKind::ReadFailed);
        assert_eq!(back.errors()[0].msg(), "short read");
        assert!(back.errors()[0].is_fatal());
        assert_eq!(back.errors()[1].kind(), ErrorKind::BadMagic);
        assert!(!back.errors()[1].is_fatal());
        // ids survive the trip because the class names do
        assert_eq!(back.errors()[0].id(), queue.errors()[0].id());
    }

    #[test]
    fn mixed_chain_reporter_tracer_queue() {
        let queue = Box::new(ErrorQueue::new());
        let tracer = Box::new(ErrorTracer::with_child(queue));
        let mut reporter = ErrorReporter::with_child(tracer);
        // must not panic, and the chain must not drop the error
        reporter.add_error(&Error::new(ErrorKind::SeekFailed, "seek past end"));
    }
}
