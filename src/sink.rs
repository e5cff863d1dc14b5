use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
#[cfg(test)]
use std::path::Path;

use chrono::{Local, NaiveDate};
use tracing::debug;

const FILE_PREFIX: &str = "midjourney_prompts_";
const LABEL_PREFIX: &str = "Prompt ";

/// Location and label of one appended prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPrompt {
    pub path: PathBuf,
    pub number: usize,
}

/// Append-only, date-stamped prompt file writer.
///
/// Each entry is written as a `Prompt <n>:` block. Numbering continues from
/// whatever labels the target file already holds, so files concatenated
/// across several runs on the same day stay continuously numbered.
#[derive(Debug, Clone)]
pub struct PromptSink {
    dir: PathBuf,
}

impl PromptSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("{}{}.txt", FILE_PREFIX, date.format("%y%m%d"))
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name(date))
    }

    /// Append to today's file.
    pub fn append(&self, text: &str) -> io::Result<SavedPrompt> {
        self.append_on(Local::now().date_naive(), text)
    }

    /// Append one entry to the file for `date`, creating it if needed. The
    /// whole entry goes out in a single write.
    pub fn append_on(&self, date: NaiveDate, text: &str) -> io::Result<SavedPrompt> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(date);

        let existing = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let number = count_labels(&existing) + 1;

        let mut entry = String::with_capacity(text.len() + 32);
        entry.push_str(separator_for(&existing));
        entry.push_str(&format!("{}{}:\n{}\n\n", LABEL_PREFIX, number, text));

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(entry.as_bytes())?;
        file.flush()?;

        debug!(path = %path.display(), number, "prompt saved");
        Ok(SavedPrompt { path, number })
    }
}

/// Number of `Prompt <n>:` label lines in `content`.
pub fn count_labels(content: &str) -> usize {
    content.lines().filter(|line| is_label(line)).count()
}

fn is_label(line: &str) -> bool {
    line.strip_prefix(LABEL_PREFIX)
        .and_then(|rest| rest.strip_suffix(':'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Newlines needed so the next entry starts after a blank line.
fn separator_for(existing: &str) -> &'static str {
    if existing.is_empty() || existing.ends_with("\n\n") {
        ""
    } else if existing.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    }
}

/// Entry texts of a prompt file, in file order.
#[cfg(test)]
pub fn read_entries(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let mut entries: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in content.lines() {
        if is_label(line) {
            if let Some(lines) = current.take() {
                entries.push(lines.join("\n").trim_end().to_string());
            }
            current = Some(Vec::new());
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current {
        entries.push(lines.join("\n").trim_end().to_string());
    }

    Ok(entries)
}
