//! Indentation-delimited block collection.

/// One line of script source with its 1-based line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    pub number: usize,
    pub text: &'a str,
}

impl<'a> SourceLine<'a> {
    pub fn indent(&self) -> usize {
        indentation(self.text)
    }

    pub fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    /// Blank or comment-only.
    pub fn is_skippable(&self) -> bool {
        let t = self.trimmed();
        t.is_empty() || t.starts_with('#')
    }
}

/// Split source into numbered lines.
pub fn source_lines(src: &str) -> Vec<SourceLine<'_>> {
    src.lines()
        .enumerate()
        .map(|(i, text)| SourceLine { number: i + 1, text })
        .collect()
}

/// Count of leading whitespace characters; blank lines have level 0.
pub fn indentation(line: &str) -> usize {
    if line.trim().is_empty() {
        return 0;
    }
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Collect the body of the compound statement whose header is
/// `lines[start - 1]`.
///
/// The body runs while lines are indented deeper than the header; blank
/// and comment lines are dropped without ending it.  Returns the body and
/// the index just past it.
pub fn parse_block<'a>(lines: &[SourceLine<'a>], start: usize) -> (Vec<SourceLine<'a>>, usize) {
    let base = start
        .checked_sub(1)
        .and_then(|i| lines.get(i))
        .map_or(0, SourceLine::indent);
    let mut body = Vec::new();
    let mut i = start;
    while let Some(line) = lines.get(i) {
        if line.is_skippable() {
            i += 1;
            continue;
        }
        if line.indent() <= base {
            break;
        }
        body.push(*line);
        i += 1;
    }
    (body, i)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
