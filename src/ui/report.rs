//! Plain-text rendering of results, tiers, history and status.
//!
//! Each `format_*` function returns the styled text so it can be tested;
//! the matching `print_*` writes it to stdout.

use console::style;
use std::fmt::Write;
use veil_common::{Comparison, HistoryEntry, HistoryResponse, LevelInfo, PrivacyLevel, Role, SessionStatus};

use crate::coordinator::{Disclosure, DisplayResult, Standing};
use crate::store::SessionSnapshot;
use crate::ui::icons::{SCALES, TROPHY};

/// `1234567.0` → `1,234,567`.
pub fn format_amount(amount: f64) -> String {
    let whole = amount.trunc().abs() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn comparison_label(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::Equal => "same tier",
        Comparison::AHigher => "initiator higher",
        Comparison::BHigher => "responder higher",
    }
}

fn disclosure_text(disclosure: &Disclosure) -> String {
    match disclosure {
        Disclosure::Undisclosed => style("undisclosed").dim().to_string(),
        Disclosure::Tier { .. } => style(disclosure.to_string()).cyan().to_string(),
    }
}

pub fn format_result(result: &DisplayResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{}", TROPHY, style("Comparison result").bold());
    let _ = writeln!(out, "  {}", result.message);
    let _ = writeln!(
        out,
        "  {}{}",
        SCALES,
        style(comparison_label(result.comparison)).bold()
    );

    let you = |role: Role| {
        if role == result.own_role {
            format!(" {}", style("(you)").dim())
        } else {
            String::new()
        }
    };
    let _ = writeln!(
        out,
        "  {}{}: {}",
        result.company_a.name,
        you(Role::Initiator),
        disclosure_text(&result.company_a.disclosure)
    );
    let _ = writeln!(
        out,
        "  {}{}: {}",
        result.company_b.name,
        you(Role::Responder),
        disclosure_text(&result.company_b.disclosure)
    );

    let standing = match result.own_standing() {
        Standing::Higher => style("Your company is in the higher tier").green(),
        Standing::Equal => style("Both companies are in the same tier").yellow(),
        Standing::Lower => style("The other company is in the higher tier").yellow(),
    };
    let _ = writeln!(out, "  {}", standing);
    if result.privacy_level == PrivacyLevel::Minimal {
        let _ = writeln!(out, "  {}", style("Minimal privacy: tiers are not disclosed").dim());
    }
    out
}

pub fn print_result(result: &DisplayResult) {
    print!("{}", format_result(result));
}

fn range_text(level: &LevelInfo) -> String {
    match (level.min, level.max) {
        (Some(min), Some(max)) => format!("{} – {}", format_amount(min), format_amount(max)),
        (Some(min), None) => format!("{}+", format_amount(min)),
        (None, Some(max)) => format!("up to {}", format_amount(max)),
        (None, None) => "-".to_string(),
    }
}

pub fn format_levels(levels: &[LevelInfo]) -> String {
    if levels.is_empty() {
        return "No tiers published by the relay.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        style(format!("{:<6} {:<14} {:<28} {}", "Tier", "Name", "Range", "Description")).bold()
    );
    for level in levels {
        let _ = writeln!(
            out,
            "{:<6} {:<14} {:<28} {}",
            level.level,
            level.name,
            range_text(level),
            level.description
        );
    }
    out
}

pub fn print_levels(levels: &[LevelInfo]) {
    print!("{}", format_levels(levels));
}

fn history_line(entry: &HistoryEntry) -> String {
    let a = entry
        .company_a_name
        .clone()
        .unwrap_or_else(|| entry.result.company_a.name.clone());
    let b = entry
        .company_b_name
        .clone()
        .unwrap_or_else(|| entry.result.company_b.name.clone());
    let privacy = entry.result.privacy_level;
    let tier = |level: Option<&LevelInfo>| match (privacy, level) {
        (PrivacyLevel::Detailed, Some(info)) => info.name.clone(),
        _ => "undisclosed".to_string(),
    };
    format!(
        "{}  {}  {} ({}) vs {} ({})  {}",
        style(&entry.session_id).cyan(),
        entry.created_at.as_deref().unwrap_or("-"),
        a,
        tier(entry.result.company_a.level_info.as_ref()),
        b,
        tier(entry.result.company_b.level_info.as_ref()),
        comparison_label(entry.result.comparison),
    )
}

pub fn format_history(history: &HistoryResponse) -> String {
    if history.history.is_empty() {
        return "No completed comparisons yet.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{} completed comparison(s)", history.count.max(history.history.len()));
    for entry in &history.history {
        let _ = writeln!(out, "  {}", history_line(entry));
    }
    out
}

pub fn print_history(history: &HistoryResponse) {
    print!("{}", format_history(history));
}

fn yes_no(flag: bool) -> console::StyledObject<&'static str> {
    if flag { style("yes").green() } else { style("no").dim() }
}

pub fn format_status(snapshot: &SessionSnapshot, age_secs: i64, status: Option<&SessionStatus>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Saved session").bold());
    let _ = writeln!(out, "  Session:   {}", style(&snapshot.session_id).cyan());
    let _ = writeln!(out, "  Company:   {}", snapshot.company_name);
    let _ = writeln!(out, "  Role:      {}", snapshot.role);
    let _ = writeln!(out, "  Committed: {}", yes_no(snapshot.committed));
    let _ = writeln!(out, "  Saved:     {}s ago", age_secs.max(0));

    if let Some(status) = status {
        let role = snapshot.role;
        let _ = writeln!(out, "{}", style("Relay status").bold());
        let _ = writeln!(out, "  Peer joined:    {}", yes_no(status.peer_joined(role)));
        let _ = writeln!(out, "  You committed:  {}", yes_no(status.committed(role)));
        let _ = writeln!(out, "  Peer committed: {}", yes_no(status.peer_committed(role)));
    }
    out
}
