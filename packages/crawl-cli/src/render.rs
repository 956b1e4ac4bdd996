//! Terminal rendering for crawl progress and history.

use colored::{ColoredString, Colorize};
use crawl_orchestrator::buckets::{self, BucketKind};
use crawl_orchestrator::{
    BucketStatus, CrawlSession, SessionProgress, SessionStatus, TerminalSummary,
    VerifyDataReport,
};

pub fn print_catalog() {
    for kind in [BucketKind::Experience, BucketKind::Role, BucketKind::Company] {
        println!("{}", kind.label().bright_cyan().bold());
        for bucket in buckets::by_kind(kind) {
            println!("  {:<20} {}", bucket.id, bucket.label.dimmed());
        }
        println!();
    }
}

fn bucket_status(status: BucketStatus) -> ColoredString {
    match status {
        BucketStatus::Completed => status.as_str().green(),
        BucketStatus::Failed => status.as_str().red(),
        BucketStatus::InProgress => status.as_str().yellow(),
        BucketStatus::Pending => status.as_str().dimmed(),
    }
}

fn session_status(status: SessionStatus) -> ColoredString {
    match status {
        SessionStatus::Completed => status.as_str().green(),
        SessionStatus::Failed => status.as_str().red(),
        SessionStatus::Partial => status.as_str().magenta(),
        SessionStatus::InProgress => status.as_str().yellow(),
        SessionStatus::Unknown => status.as_str().dimmed(),
    }
}

fn bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) / 5;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(20 - filled))
}

pub fn print_progress(progress: &SessionProgress) {
    println!(
        "{} {:>3}%  ({} done, {} failed, {} jobs found, {} added)",
        bar(progress.percent_complete()),
        progress.percent_complete(),
        progress.stats.completed_buckets,
        progress.stats.failed_buckets,
        progress.stats.total_jobs_found,
        progress.stats.total_jobs_added,
    );
    for bucket in &progress.buckets {
        println!(
            "    {:<20} {:<12} {}",
            bucket.bucket.as_str(),
            bucket_status(bucket.status),
            bar(bucket.progress)
        );
    }
}

pub fn print_summary(summary: &TerminalSummary) {
    println!();
    println!(
        "Session {} finished: {}",
        summary.session_id.as_str().bold(),
        session_status(summary.status)
    );
    println!(
        "  jobs found {}, added {}, updated {}",
        summary.stats.total_jobs_found, summary.stats.total_jobs_added, summary.stats.jobs_updated
    );
    println!(
        "  indian jobs found {}, added {}",
        summary.stats.indian_jobs_found, summary.stats.indian_jobs_added
    );
    if !summary.completed.is_empty() {
        println!("  {} {}", "completed:".green(), join(&summary.completed));
    }
    if !summary.failed.is_empty() {
        println!("  {} {}", "failed:".red(), join(&summary.failed));
    }
    if let Some(ms) = summary.duration_ms {
        println!("  took {:.1}s", ms as f64 / 1000.0);
    }
    if let Some(error) = &summary.error_message {
        println!("  {} {}", "error:".red(), error);
    }
}

pub fn print_history(sessions: &[CrawlSession], limit: usize) {
    if sessions.is_empty() {
        println!("{}", "No crawl sessions yet.".dimmed());
        return;
    }
    for session in sessions.iter().take(limit) {
        let started = session
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<12} {}  {}/{} buckets, {} found, {} added",
            session.session_id.as_str(),
            session_status(session.status),
            started,
            session.buckets_completed.len(),
            session.buckets_requested.len(),
            session.total_jobs_found,
            session.new_jobs_added,
        );
    }
}

pub fn print_verify_report(report: &VerifyDataReport) {
    if let Some(total) = report.total_jobs {
        println!("total jobs:  {}", total);
    }
    if let Some(indian) = report.indian_jobs {
        println!("indian jobs: {}", indian);
    }
    if let Some(session) = &report.latest_session {
        println!(
            "latest session: {} ({})",
            session.session_id.as_str(),
            session_status(session.status)
        );
    }
    let mut extra: Vec<_> = report.extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        println!("{}: {}", key, value);
    }
}

fn join(buckets: &[crawl_orchestrator::BucketId]) -> String {
    buckets
        .iter()
        .map(|b| b.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
