#![forbid(unsafe_code)]

//! Turns WebVTT/SRT subtitle tracks into plain transcript text.
//!
//! Automatic captions are published as rolling windows: every cue repeats the
//! line shown by the previous cue before adding a new one. Normalization keeps
//! each spoken line once and drops every timing artifact.

/// Normalizes a raw subtitle track into newline-separated transcript lines.
pub fn normalize_track(raw: &str) -> String {
    transcript_lines(raw).join("\n")
}

pub fn transcript_lines(raw: &str) -> Vec<String> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut lines = Vec::new();
    let mut previous_cue: Vec<String> = Vec::new();
    let mut current: Option<Vec<String>> = None;
    let mut skipping_block = false;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');

        // Only a truly empty line ends a block; whitespace-only lines belong to
        // the cue they sit in.
        if line.is_empty() {
            if let Some(cue) = current.take() {
                flush_cue(cue, &mut previous_cue, &mut lines);
            }
            skipping_block = false;
            continue;
        }

        if let Some(cue) = current.as_mut() {
            cue.push(line.to_owned());
            continue;
        }
        if skipping_block {
            continue;
        }

        if line.contains("-->") {
            current = Some(Vec::new());
        } else if ["WEBVTT", "NOTE", "STYLE", "REGION"]
            .iter()
            .any(|marker| line.starts_with(marker))
        {
            skipping_block = true;
        }
        // Anything else is a cue identifier or an SRT sequence number.
    }

    if let Some(cue) = current.take() {
        flush_cue(cue, &mut previous_cue, &mut lines);
    }
    lines
}

fn flush_cue(cue: Vec<String>, previous_cue: &mut Vec<String>, out: &mut Vec<String>) {
    let cleaned: Vec<String> = cue
        .iter()
        .map(|line| clean_cue_text(line))
        .filter(|line| !line.is_empty())
        .collect();

    for line in &cleaned {
        let repeated_window = previous_cue.contains(line);
        let repeated_last = out.last() == Some(line);
        if !repeated_window && !repeated_last {
            out.push(line.clone());
        }
    }
    *previous_cue = cleaned;
}

/// Strips inline markup (`<00:00:01.200>`, `<c>`, `<i>`, `<v Speaker>`),
/// decodes common entities and collapses whitespace.
fn clean_cue_text(line: &str) -> String {
    let mut stripped = String::with_capacity(line.len());
    let mut in_tag = false;
    for ch in line.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&lrm;", "")
        .replace("&rlm;", "")
        .replace("&amp;", "&")
}
