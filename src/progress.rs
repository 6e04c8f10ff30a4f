//! Upload progress reporting.
//!
//! `signals index upload` sends documents in batches. Each acknowledged batch
//! is reported with the running document count and the number of items the
//! index rejected inside it, so a long upload shows both how far it got and
//! whether the index is accepting what it receives. Progress goes to
//! **stderr**; stdout keeps only the final summary.

use std::io::Write;
use std::str::FromStr;

use crate::display::format_count;

/// A single progress event for an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadProgressEvent {
    /// Documents are loaded and split; nothing has been sent yet.
    Started { documents: usize, batches: usize },
    /// Batch `batch` (1-based) of `batches` was acknowledged.
    BatchSent {
        batch: usize,
        batches: usize,
        sent: usize,
        total: usize,
        /// Items in this batch the index reported as failed.
        failed: usize,
    },
}

pub trait UploadProgressReporter: Send + Sync {
    fn report(&self, event: UploadProgressEvent);
}

/// Human-readable lines: `upload fashion-search  batch 2/3  128 / 130 documents`.
pub struct StderrProgress {
    index: String,
}

impl StderrProgress {
    fn line(&self, event: &UploadProgressEvent) -> String {
        match event {
            UploadProgressEvent::Started { documents, batches } => format!(
                "upload {}  {} documents in {} batches",
                self.index,
                format_count(*documents),
                format_count(*batches)
            ),
            UploadProgressEvent::BatchSent {
                batch,
                batches,
                sent,
                total,
                failed,
            } => {
                let mut line = format!(
                    "upload {}  batch {}/{}  {} / {} documents",
                    self.index,
                    batch,
                    batches,
                    format_count(*sent),
                    format_count(*total)
                );
                if *failed > 0 {
                    line.push_str(&format!("  ({} failed)", format_count(*failed)));
                }
                line
            }
        }
    }
}

impl UploadProgressReporter for StderrProgress {
    fn report(&self, event: UploadProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", self.line(&event));
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress {
    index: String,
}

impl JsonProgress {
    fn object(&self, event: &UploadProgressEvent) -> serde_json::Value {
        match event {
            UploadProgressEvent::Started { documents, batches } => serde_json::json!({
                "event": "upload",
                "phase": "started",
                "index": self.index,
                "documents": documents,
                "batches": batches,
            }),
            UploadProgressEvent::BatchSent {
                batch,
                batches,
                sent,
                total,
                failed,
            } => serde_json::json!({
                "event": "upload",
                "phase": "batch",
                "index": self.index,
                "batch": batch,
                "batches": batches,
                "sent": sent,
                "total": total,
                "failed": failed,
            }),
        }
    }
}

impl UploadProgressReporter for JsonProgress {
    fn report(&self, event: UploadProgressEvent) {
        if let Ok(line) = serde_json::to_string(&self.object(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl UploadProgressReporter for NoProgress {
    fn report(&self, _event: UploadProgressEvent) {}
}

/// `--progress` value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// The requested mode, or human output when none was given and stderr
    /// is a terminal.
    pub fn resolve(requested: Option<ProgressMode>) -> Self {
        requested.unwrap_or_else(|| {
            if atty::is(atty::Stream::Stderr) {
                ProgressMode::Human
            } else {
                ProgressMode::Off
            }
        })
    }

    /// Reporter labelling every line with `index`.
    pub fn reporter(self, index: &str) -> Box<dyn UploadProgressReporter> {
        let index = index.to_string();
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress { index }),
            ProgressMode::Json => Box::new(JsonProgress { index }),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}'. Use off, human, or json.",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(batch: usize, sent: usize, failed: usize) -> UploadProgressEvent {
        UploadProgressEvent::BatchSent {
            batch,
            batches: 3,
            sent,
            total: 1300,
            failed,
        }
    }

    #[test]
    fn human_lines_show_batches_and_failures() {
        let p = StderrProgress {
            index: "fashion-search".into(),
        };
        assert_eq!(
            p.line(&UploadProgressEvent::Started {
                documents: 1300,
                batches: 3
            }),
            "upload fashion-search  1,300 documents in 3 batches"
        );
        assert_eq!(
            p.line(&batch(1, 640, 0)),
            "upload fashion-search  batch 1/3  640 / 1,300 documents"
        );
        assert_eq!(
            p.line(&batch(2, 1280, 2)),
            "upload fashion-search  batch 2/3  1,280 / 1,300 documents  (2 failed)"
        );
    }

    #[test]
    fn json_objects_carry_counts() {
        let p = JsonProgress {
            index: "fashion-search".into(),
        };
        let obj = p.object(&batch(3, 1300, 1));
        assert_eq!(obj["phase"], "batch");
        assert_eq!(obj["index"], "fashion-search");
        assert_eq!(obj["batch"], 3);
        assert_eq!(obj["sent"], 1300);
        assert_eq!(obj["failed"], 1);
    }

    #[test]
    fn explicit_mode_wins_over_tty_default() {
        assert_eq!(ProgressMode::resolve(Some(ProgressMode::Json)), ProgressMode::Json);
        assert_eq!(ProgressMode::resolve(Some(ProgressMode::Off)), ProgressMode::Off);
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!("json".parse::<ProgressMode>(), Ok(ProgressMode::Json));
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
