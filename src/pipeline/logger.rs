//! User-facing message sink for the analysis.
//!
//! Messages are also emitted through `tracing`; the logger exists so a host
//! application can show them without installing a subscriber.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;

pub enum AnalysisLogger {
    Callback(Box<dyn Fn(&str) + Send>),
    Channel(Sender<String>),
}

impl AnalysisLogger {
    pub fn callback(f: impl Fn(&str) + Send + 'static) -> Self {
        AnalysisLogger::Callback(Box::new(f))
    }

    /// Logger feeding an unbounded channel, together with its receiving end.
    pub fn channel() -> (Self, Receiver<String>) {
        let (tx, rx) = unbounded();
        (AnalysisLogger::Channel(tx), rx)
    }

    pub fn log(&self, message: &str) {
        match self {
            AnalysisLogger::Callback(f) => f(message),
            AnalysisLogger::Channel(tx) => {
                // A dropped receiver just means nobody is listening.
                let _ = tx.send(message.to_string());
            }
        }
    }
}

impl fmt::Debug for AnalysisLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisLogger::Callback(_) => f.write_str("AnalysisLogger::Callback"),
            AnalysisLogger::Channel(_) => f.write_str("AnalysisLogger::Channel"),
        }
    }
}
