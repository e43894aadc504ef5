//! Templates used when no prompt file defines the name.

const SYSTEM_PROMPT: &str = "\
You are a songwriting assistant. Reply only with newline-delimited JSON: \
one complete JSON object per line, no prose and no markdown.";

const CHAT_SUMMARY_SYSTEM: &str = "\
You condense songwriting conversations. Keep every decision the writer made \
(names, themes, moods, hooks, lyric lines they accepted or rejected) and drop \
chatter. Reply with plain text only.";

const STYLE_SUMMARY: &str = "\
Summarise this {{ conversation_type }} conversation so it can replace the full history.
List the styles that were proposed, which ones the writer preferred, and any constraints they stated.

{{ conversation_content }}";

const LYRICS_SUMMARY: &str = "\
Summarise this {{ conversation_type }} conversation so it can replace the full history.
Keep the latest full lyric draft verbatim, then note requested changes that are still open.

{{ conversation_content }}";

pub fn builtin_prompt(name: &str) -> Option<&'static str> {
    match name {
        "system_prompt" => Some(SYSTEM_PROMPT),
        "chat_summary.system_prompt" => Some(CHAT_SUMMARY_SYSTEM),
        "style_summary" => Some(STYLE_SUMMARY),
        "lyrics_summary" => Some(LYRICS_SUMMARY),
        _ => None,
    }
}
