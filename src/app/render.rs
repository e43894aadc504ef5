use crate::conversation::{ConversationStats, LogInfo, SummaryReport};
use std::fmt::Write as _;

const RULE_WIDTH: usize = 50;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

#[allow(clippy::cast_precision_loss)]
fn kib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

pub fn render_log_list(logs: &[LogInfo]) -> String {
    let mut out = format!("◆ Conversation logs\n{}\n", rule());
    if logs.is_empty() {
        out.push_str("No conversation logs found.\n");
        return out;
    }
    for log in logs {
        let _ = writeln!(
            out,
            "  {:<32} {:>9.1} KB  {:>3} sessions",
            log.file_name,
            kib(log.size_bytes),
            log.sessions
        );
    }
    let _ = writeln!(out, "\nTotal: {} log files", logs.len());
    out
}

pub fn render_log_info(info: &LogInfo) -> String {
    let mut out = format!("◆ {}\n{}\n", info.file_name, rule());
    if !info.exists {
        let _ = writeln!(out, "Log file does not exist: {}", info.path.display());
        return out;
    }
    let _ = writeln!(out, "Path: {}", info.path.display());
    let _ = writeln!(out, "Size: {:.1} KB ({} bytes)", kib(info.size_bytes), info.size_bytes);
    let _ = writeln!(out, "Sessions: {}", info.sessions);
    if let Some(modified) = info.modified {
        let _ = writeln!(out, "Last modified: {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    out
}

/// Whole log, or its last `tail` characters with a notice.
pub fn render_log_view(name: &str, content: &str, tail: usize) -> String {
    let mut out = format!("◆ Content: {name}\n{}\n", rule());
    let total = content.chars().count();
    if total > tail {
        let skip = total - tail;
        let start = content.char_indices().nth(skip).map_or(0, |(idx, _)| idx);
        let _ = writeln!(out, "File is large ({total} chars). Showing last {tail} characters:");
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        out.push_str(&content[start..]);
    } else {
        out.push_str(content);
    }
    out
}

pub fn render_stats(song_id: i64, purpose: &str, stats: &ConversationStats) -> String {
    format!(
        "◆ song {song_id} / {purpose}\n{}\n\
         total      {}\n\
         system     {}\n\
         user       {}\n\
         assistant  {}\n\
         incomplete {}\n\
         summaries  {}\n",
        rule(),
        stats.total,
        stats.system,
        stats.user,
        stats.assistant,
        if stats.has_incomplete { "yes" } else { "no" },
        if stats.has_summaries { "yes" } else { "no" },
    )
}

pub fn render_summary_report(report: &SummaryReport) -> String {
    let status = if report.summarized {
        "✓ summarized"
    } else {
        "! not summarized"
    };
    format!(
        "{status}: song {} / {}\n  messages {} → {}\n  still over budget: {}\n",
        report.song_id,
        report.purpose,
        report.before.total,
        report.after.total,
        if report.needs_summarization { "yes" } else { "no" },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Purpose;
    use std::path::PathBuf;

    fn info(name: &str, exists: bool) -> LogInfo {
        LogInfo {
            file_name: name.into(),
            path: PathBuf::from("/tmp/logs").join(name),
            exists,
            size_bytes: 2048,
            modified: None,
            sessions: 3,
        }
    }

    #[test]
    fn list_shows_totals() {
        let text = render_log_list(&[info("lyrics_1.log", true), info("names.log", true)]);
        assert!(text.contains("lyrics_1.log"));
        assert!(text.contains("2.0 KB"));
        assert!(text.ends_with("Total: 2 log files\n"));
        assert!(render_log_list(&[]).contains("No conversation logs found."));
    }

    #[test]
    fn info_reports_missing_files() {
        assert!(render_log_info(&info("style_9.log", false)).contains("does not exist"));
        let text = render_log_info(&info("style_9.log", true));
        assert!(text.contains("Sessions: 3"));
        assert!(text.contains("(2048 bytes)"));
    }

    #[test]
    fn large_logs_show_only_the_tail() {
        let content = format!("{}TAIL", "x".repeat(2000));
        let text = render_log_view("lyrics_1.log", &content, 10);
        assert!(text.contains("Showing last 10 characters"));
        assert!(text.ends_with("xxxxxxTAIL"));
        assert!(!text.contains(&"x".repeat(20)));

        assert!(render_log_view("a.log", "short", 1000).ends_with("short"));
    }

    #[test]
    fn report_rendering() {
        let report = SummaryReport {
            song_id: 4,
            purpose: Purpose::Lyrics,
            summarized: true,
            before: ConversationStats {
                total: 6,
                ..ConversationStats::default()
            },
            after: ConversationStats {
                total: 1,
                has_summaries: true,
                ..ConversationStats::default()
            },
            needs_summarization: false,
        };
        let text = render_summary_report(&report);
        assert!(text.starts_with("✓ summarized: song 4 / lyrics"));
        assert!(text.contains("messages 6 → 1"));
        assert!(render_stats(4, "lyrics", &report.after).contains("summaries  yes"));
    }
}
