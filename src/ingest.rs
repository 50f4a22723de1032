//! Detection and pose stream files.
//!
//! The upstream inference pipeline writes one record per processed frame,
//! either as a single JSON array or as JSON Lines (`.jsonl` / `.ndjson`).
//! JSON Lines files are read lazily so long videos can be analyzed batch by
//! batch; JSON arrays are parsed in one go.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFormat {
    JsonArray,
    JsonLines,
}

impl StreamFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                StreamFormat::JsonLines
            }
            _ => StreamFormat::JsonArray,
        }
    }
}

/// Iterator over the frames of one stream file.
pub struct FrameReader<T> {
    source: Source<T>,
}

enum Source<T> {
    Lines {
        path: PathBuf,
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
    Parsed(std::vec::IntoIter<T>),
}

impl<T: DeserializeOwned> FrameReader<T> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open frame stream {}", path.display()))?;
        let source = match StreamFormat::from_path(path) {
            StreamFormat::JsonLines => Source::Lines {
                path: path.to_path_buf(),
                lines: BufReader::new(file).lines(),
                line_no: 0,
            },
            StreamFormat::JsonArray => {
                let frames: Vec<T> = serde_json::from_reader(BufReader::new(file))
                    .map_err(|e| anyhow!("invalid frame stream {}: {}", path.display(), e))?;
                Source::Parsed(frames.into_iter())
            }
        };
        Ok(Self { source })
    }

    /// Up to `size` frames; empty once the stream is exhausted.
    pub fn next_batch(&mut self, size: usize) -> Result<Vec<T>> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size {
            match self.next() {
                Some(frame) => batch.push(frame?),
                None => break,
            }
        }
        Ok(batch)
    }
}

impl<T: DeserializeOwned> Iterator for FrameReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Parsed(frames) => frames.next().map(Ok),
            Source::Lines {
                path,
                lines,
                line_no,
            } => loop {
                let line = match lines.next()? {
                    Ok(line) => line,
                    Err(e) => {
                        return Some(Err(anyhow!("failed to read {}: {}", path.display(), e)))
                    }
                };
                *line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&line).map_err(|e| {
                    anyhow!("invalid frame at {}:{}: {}", path.display(), line_no, e)
                }));
            },
        }
    }
}

/// Read a whole stream file.
pub fn read_frames<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    FrameReader::open(path)?.collect()
}
