use crate::types::{
    AuditAction, AuditEntry, ConversationEntry, KnowledgeItem, MessageStatus, Role, UsageStats,
};
use colored::{ColoredString, Colorize};

// Format number with thousands separator
pub fn format_number_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let mut count = 0;

    for c in s.chars().rev() {
        if count == 3 {
            result.push(',');
            count = 0;
        }
        result.push(c);
        count += 1;
    }

    result.chars().rev().collect()
}

// Format latency
pub fn format_latency(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[inline]
fn role_label(role: Role) -> ColoredString {
    match role {
        Role::User => "you".green().bold(),
        Role::Assistant => "architect".cyan().bold(),
        Role::System => "system".red().bold(),
    }
}

/// One conversation line; unsaved messages are flagged
pub fn render_entry(entry: &ConversationEntry) -> String {
    let suffix = match entry.status {
        MessageStatus::LocalOnly if entry.message.role != Role::System => {
            format!(" {}", "(not saved)".yellow())
        }
        _ => String::new(),
    };
    format!(
        "{}> {}{}",
        role_label(entry.message.role),
        entry.message.content,
        suffix
    )
}

pub fn render_audit_entry(entry: &AuditEntry) -> String {
    let action = match entry.action {
        AuditAction::InferenceSuccess => entry.action.to_string().green(),
        AuditAction::InferenceError => entry.action.to_string().red(),
        AuditAction::StoreError => entry.action.to_string().yellow(),
    };
    let latency = entry
        .latency_ms
        .map(|ms| format!(" {}", format_latency(ms)))
        .unwrap_or_default();
    let error = entry
        .error
        .as_deref()
        .map(|e| format!(" {}", e.dimmed()))
        .unwrap_or_default();

    format!(
        "{} {} {} {} units {}{}{}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        action,
        entry.model_id,
        format_number_with_commas(entry.usage.total()),
        entry.estimated_cost,
        latency,
        error
    )
}

pub fn render_usage(stats: &UsageStats) -> Vec<String> {
    let mut lines = vec![format!(
        "💰 {} total, {} units, {} ok, {} failed, {} store errors",
        stats.total_cost.to_string().bold(),
        format_number_with_commas(stats.total_units),
        stats.successes,
        stats.inference_errors,
        stats.store_errors
    )];

    let mut models: Vec<_> = stats.by_model.iter().collect();
    models.sort_by(|a, b| a.0.cmp(b.0));
    for (model, usage) in models {
        lines.push(format!(
            "   {} {} requests, {} units, {}",
            model.to_string().yellow(),
            usage.requests,
            format_number_with_commas(usage.units),
            usage.cost
        ));
    }
    lines
}

pub fn render_knowledge_item(item: &KnowledgeItem) -> String {
    let preview: String = item.content.chars().take(60).collect();
    let ellipsis = if item.content.chars().count() > 60 {
        "…"
    } else {
        ""
    };
    format!(
        "{} {} {}{}",
        item.id.to_string().dimmed(),
        item.title.bold(),
        preview.replace('\n', " "),
        ellipsis
    )
}
