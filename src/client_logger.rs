//! Logging of the traffic between gpterm and the model endpoint.
//!
//! Implement [`ClientLogger`] to observe every request the [`OpenAi`] client
//! sends and every piece of text that comes back.  [`JsonLinesLogger`]
//! appends each record as one JSON object per line, which is what the
//! `--log FILE` option of the binary installs.
//!
//! [`OpenAi`]: crate::OpenAi

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::ChatRequest;

/// A trait for logging client traffic.
pub trait ClientLogger: Send + Sync {
    /// Log a request right before it is sent.
    fn log_request(&self, request: &ChatRequest);

    /// Log one fragment of a streamed reply, in arrival order.
    fn log_fragment(&self, fragment: &str);

    /// Log the full text of a reply once it is complete.
    ///
    /// For streams this is the concatenation of every logged fragment.
    fn log_reply(&self, reply: &str);
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Request { request: &'a ChatRequest },
    Fragment { text: &'a str },
    Reply { text: &'a str },
}

/// Appends one JSON object per logged event to a file.
pub struct JsonLinesLogger {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesLogger {
    /// Opens `path` for appending, creating it when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|err| Error::io("failed to open log file", err))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    // Write failures are ignored.
    fn write(&self, record: &Record<'_>) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *writer, record).is_ok() {
            let _ = writer.write_all(b"\n");
            let _ = writer.flush();
        }
    }
}

impl ClientLogger for JsonLinesLogger {
    fn log_request(&self, request: &ChatRequest) {
        self.write(&Record::Request { request });
    }

    fn log_fragment(&self, fragment: &str) {
        self.write(&Record::Fragment { text: fragment });
    }

    fn log_reply(&self, reply: &str) {
        self.write(&Record::Reply { text: reply });
    }
}
