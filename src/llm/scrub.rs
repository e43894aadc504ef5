use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Prefixes of the provider keys songsmith handles.
const KEY_PREFIXES: [&str; 4] = ["sk-ant-", "sk-proj-", "sk-", "AIza"];

/// Markers after which a credential value follows.
const KEY_MARKERS: [&str; 6] = [
    "Authorization: Bearer ",
    "authorization: bearer ",
    "api_key=",
    "key=",
    "\"api_key\":\"",
    "x-api-key: ",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !is_secret_char(*c))
        .map_or(input.len(), |(i, _)| from + i)
}

fn redact_after(scrubbed: &mut String, marker: &str, keep_marker: bool) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let start = search_from + rel;
        let value_start = start + marker.len();
        let end = token_end(scrubbed, value_start);

        // Bare marker without a value.
        if end == value_start {
            search_from = value_start;
            continue;
        }

        let replace_from = if keep_marker { value_start } else { start };
        scrubbed.replace_range(replace_from..end, REDACTED);
        search_from = replace_from + REDACTED.len();
    }
}

/// Scrub provider credentials from text before it reaches logs or clients.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    let needs_work = KEY_PREFIXES.iter().any(|p| input.contains(p))
        || KEY_MARKERS.iter().any(|m| input.contains(m));
    if !needs_work {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in KEY_MARKERS {
        redact_after(&mut scrubbed, marker, true);
    }
    for prefix in KEY_PREFIXES {
        redact_after(&mut scrubbed, prefix, false);
    }
    Cow::Owned(scrubbed)
}

/// Clip to `max_chars`, backing off rather than leaving half a redaction marker.
fn clip(text: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return Cow::Borrowed(text);
    };
    let mut head = &text[..cut];
    if let Some(open) = head.rfind('[')
        && head.len() - open < REDACTED.len()
        && REDACTED.starts_with(&head[open..])
    {
        head = &head[..open];
    }
    Cow::Owned(format!("{}...", head.trim_end()))
}

/// Sanitize API error text by scrubbing secrets and clipping its length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    clip(&scrubbed, MAX_API_ERROR_CHARS).into_owned()
}
