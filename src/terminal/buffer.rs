//! Scroll-back buffer that folds raw output chunks into rendered text.
//!
//! Package-manager binaries draw progress with bare carriage returns,
//! backspaces and ANSI escape sequences, and the chunks arriving over the
//! event channel can split an escape sequence at any byte. The buffer keeps
//! the unclassifiable tail of a chunk aside and retries it when the next
//! chunk arrives, so feeding chunks one by one always renders the same text
//! as feeding their concatenation at once.

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';

/// Rendered multi-line output plus carry-over state between chunks
#[derive(Debug, Clone, Default)]
pub struct TerminalBuffer {
    /// Lines terminated by a newline-equivalent action, oldest first
    completed: Vec<String>,
    /// Line currently being written, not yet terminated
    current: String,
    /// Incomplete control sequence held back from the previous chunk.
    /// Never part of the rendered text.
    pending: String,
}

impl TerminalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw chunk into the buffer.
    ///
    /// Control sequences (CSI, OSC, DCS/APC/PM/SOS and two-byte escapes) are
    /// consumed and discarded; no cursor grid is modeled. Malformed or
    /// truncated sequences never fail, at worst their bytes stay pending
    /// until more input arrives or the buffer is cleared.
    pub fn append(&mut self, chunk: &str) {
        let input: Vec<char> = self.pending.chars().chain(chunk.chars()).collect();
        self.pending.clear();

        let mut i = 0;
        while i < input.len() {
            let ch = input[i];

            if ch == ESC {
                let Some(&next) = input.get(i + 1) else {
                    self.pending.push(ESC);
                    break;
                };

                // CSI: consume through the final byte (0x40..=0x7e)
                if next == '[' {
                    let mut j = i + 2;
                    while j < input.len() && !is_csi_final(input[j]) {
                        j += 1;
                    }
                    if j >= input.len() {
                        self.pending.extend(&input[i..]);
                        break;
                    }
                    i = j + 1;
                    continue;
                }

                // OSC: consume through BEL or ESC \
                if next == ']' {
                    let mut j = i + 2;
                    while j < input.len() {
                        if input[j] == BEL {
                            break;
                        }
                        if input[j] == ESC && input.get(j + 1) == Some(&'\\') {
                            j += 1;
                            break;
                        }
                        j += 1;
                    }
                    if j >= input.len() {
                        self.pending.extend(&input[i..]);
                        break;
                    }
                    i = j + 1;
                    continue;
                }

                // DCS / APC / PM / SOS: consume through ESC \
                if matches!(next, 'P' | '_' | '^' | 'X') {
                    match find_string_terminator(&input, i + 2) {
                        Some(j) => {
                            i = j + 2;
                            continue;
                        }
                        None => {
                            self.pending.extend(&input[i..]);
                            break;
                        }
                    }
                }

                // Anything else is a two-byte escape, discarded
                i += 2;
                continue;
            }

            if ch == '\r' {
                match input.get(i + 1) {
                    // A following LF would change the meaning, hold the CR back
                    None => {
                        self.pending.push('\r');
                        break;
                    }
                    Some('\n') => {
                        self.completed.push(std::mem::take(&mut self.current));
                        i += 2;
                    }
                    // Bare CR: return to column 0 and overwrite
                    Some(_) => {
                        self.current.clear();
                        i += 1;
                    }
                }
                continue;
            }

            if ch == '\n' {
                self.completed.push(std::mem::take(&mut self.current));
                i += 1;
                continue;
            }

            if ch == '\u{8}' {
                self.current.pop();
                i += 1;
                continue;
            }

            if ch == '\0' {
                i += 1;
                continue;
            }

            self.current.push(ch);
            i += 1;
        }
    }

    /// Full rendered text: completed lines newline-joined, then the current line
    pub fn rendered(&self) -> String {
        if self.completed.is_empty() {
            return self.current.clone();
        }
        format!("{}\n{}", self.completed.join("\n"), self.current)
    }

    /// Completed lines only, oldest first
    pub fn completed_lines(&self) -> &[String] {
        &self.completed
    }

    /// Reset to an empty buffer, dropping any pending control bytes
    pub fn clear(&mut self) {
        self.completed.clear();
        self.current.clear();
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.current.is_empty() && self.pending.is_empty()
    }
}

fn is_csi_final(c: char) -> bool {
    (0x40..=0x7e).contains(&(c as u32))
}

/// Position of the `ESC` of an `ESC \` pair at or after `from`, if complete
fn find_string_terminator(input: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while j + 1 < input.len() {
        if input[j] == ESC && input[j + 1] == '\\' {
            return Some(j);
        }
        j += 1;
    }
    None
}
